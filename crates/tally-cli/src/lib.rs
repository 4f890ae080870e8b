//! `tally` command line: runs the invoice engine over workbook files.
//!
//! The binary is a thin wrapper around [`cli::main`]; keeping the argument surface in the library
//! lets integration tests drive it in-process.

pub mod cli;
