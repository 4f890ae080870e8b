//! Invoice weight redistribution.
//!
//! Given an invoice workbook built from a known template, the engine
//!
//! 1. fits the template's bag band to the requested bag count ([`provision`]),
//! 2. splits a target weight into per-bag weights that add up exactly ([`distribute`]),
//! 3. writes the weights, totals and shipment metadata into the sheet ([`stamp`]),
//! 4. returns either the re-encoded workbook or a read-only [`Projection`] of it.
//!
//! [`Engine`] ties the steps together for one request at a time:
//!
//! ```no_run
//! use tally_engine::{Engine, EngineConfig, ProcessingRequest};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let bytes = std::fs::read("invoice.xlsx").unwrap();
//! let request = ProcessingRequest {
//!     bag_count: Some(25),
//!     target_weight: Some(1000.5),
//!     seed: Some(7),
//!     ..ProcessingRequest::default()
//! };
//! let out = engine.process(&bytes, &request).unwrap();
//! std::fs::write(&out.filename, &out.bytes).unwrap();
//! ```

pub mod config;
pub mod distribute;
mod engine;
mod error;
pub mod project;
pub mod provision;
pub mod render;
pub mod request;
pub mod stamp;
pub mod template;

pub use config::{ConfigError, EngineConfig, PageSize, RenderConfig, WeightFont};
pub use distribute::{distribute, distribute_with_rng, DistributeOptions, VariationBand, WeightPlan};
pub use engine::{
    suggested_filename, Engine, Mode, Output, Pipeline, PipelineState, PreviewOutput,
    ProcessOutput,
};
pub use error::{EngineError, ErrorKind, ErrorReport};
pub use project::{project, Projection, ProjectionMetadata};
pub use provision::{provision, ProvisionOutcome};
pub use render::{render_text, TextRendering};
pub use request::{Metadata, ProcessingRequest, ValidatedRequest};
pub use stamp::{stamp, StampOptions, StampReport};
pub use template::{BandLayout, TemplateDescriptor, TemplateRegistry};
