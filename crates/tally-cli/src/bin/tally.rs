use std::process::ExitCode;

fn main() -> ExitCode {
    tally_cli::cli::main()
}
