//! Request orchestration.
//!
//! An [`Engine`] holds the read-only configuration and template registry and can be shared
//! between requests. Each request runs through its own [`Pipeline`], which owns the request-local
//! document and records the states it passed through.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tally_xlsx::{PackageLimits, XlsxDocument};

use crate::config::EngineConfig;
use crate::distribute::{distribute_with_rng, DistributeOptions, WeightPlan};
use crate::project::{project, Projection};
use crate::provision::{provision, ProvisionOutcome};
use crate::render::{render_text, TextRendering};
use crate::request::{ProcessingRequest, ValidatedRequest};
use crate::stamp::{stamp, StampOptions};
use crate::template::{BandLayout, TemplateRegistry};
use crate::{EngineError, ErrorKind};

const DEFAULT_STEM: &str = "invoice";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Received,
    Validated,
    Provisioned,
    Distributed,
    Stamped,
    Serialized,
    Done,
    Failed(ErrorKind),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Process,
    Preview,
}

/// Result of a `process` request.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessOutput {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub seed: u64,
    pub weights: Vec<f64>,
    pub projection: Projection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendering: Option<TextRendering>,
    pub trace: Vec<PipelineState>,
}

/// Result of a `preview` request.
#[derive(Clone, Debug, Serialize)]
pub struct PreviewOutput {
    pub seed: u64,
    pub projection: Projection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendering: Option<TextRendering>,
    pub trace: Vec<PipelineState>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    Process(ProcessOutput),
    Preview(PreviewOutput),
}

#[derive(Clone, Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: TemplateRegistry,
    limits: PackageLimits,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = TemplateRegistry::with_overrides(&config.templates);
        Self {
            config,
            registry,
            limits: PackageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PackageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Stamp the workbook in `bytes` and return the re-encoded artifact.
    pub fn process(
        &self,
        bytes: &[u8],
        request: &ProcessingRequest,
    ) -> Result<ProcessOutput, EngineError> {
        Pipeline::new(self, request).process(bytes)
    }

    /// Stamp the workbook in `bytes` in memory and return its projection.
    pub fn preview(
        &self,
        bytes: &[u8],
        request: &ProcessingRequest,
    ) -> Result<PreviewOutput, EngineError> {
        Pipeline::new(self, request).preview(bytes)
    }

    pub fn run(
        &self,
        bytes: &[u8],
        request: &ProcessingRequest,
        mode: Mode,
    ) -> Result<Output, EngineError> {
        match mode {
            Mode::Process => self.process(bytes, request).map(Output::Process),
            Mode::Preview => self.preview(bytes, request).map(Output::Preview),
        }
    }
}

/// A stamped, request-local document waiting for its output mode.
struct Stamped {
    xlsx: XlsxDocument,
    valid: ValidatedRequest,
    plan: WeightPlan,
    seed: u64,
    projection: Projection,
    rendering: Option<TextRendering>,
}

/// One request's trip through the engine, consumed by [`Pipeline::process`] or
/// [`Pipeline::preview`].
pub struct Pipeline<'e> {
    engine: &'e Engine,
    request: &'e ProcessingRequest,
    trace: Vec<PipelineState>,
}

impl<'e> Pipeline<'e> {
    pub fn new(engine: &'e Engine, request: &'e ProcessingRequest) -> Self {
        Self {
            engine,
            request,
            trace: vec![PipelineState::Received],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.trace
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    pub fn trace(&self) -> &[PipelineState] {
        &self.trace
    }

    pub fn process(mut self, bytes: &[u8]) -> Result<ProcessOutput, EngineError> {
        let result = self.stamp_request(bytes).and_then(|mut stamped| {
            let out = stamped.xlsx.save()?;
            Ok((stamped, out))
        });
        let (stamped, bytes) = self.settle(result)?;
        self.advance(PipelineState::Serialized);
        self.advance(PipelineState::Done);
        Ok(ProcessOutput {
            filename: suggested_filename(stamped.valid.filename.as_deref()),
            bytes,
            seed: stamped.seed,
            weights: stamped.plan.values(),
            projection: stamped.projection,
            rendering: stamped.rendering,
            trace: self.trace,
        })
    }

    pub fn preview(mut self, bytes: &[u8]) -> Result<PreviewOutput, EngineError> {
        let result = self.stamp_request(bytes);
        let stamped = self.settle(result)?;
        self.advance(PipelineState::Serialized);
        self.advance(PipelineState::Done);
        Ok(PreviewOutput {
            seed: stamped.seed,
            projection: stamped.projection,
            rendering: stamped.rendering,
            trace: self.trace,
        })
    }

    fn advance(&mut self, next: PipelineState) {
        log::debug!("{:?} -> {next:?}", self.state());
        self.trace.push(next);
    }

    fn settle<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(err) = &result {
            log::debug!("request failed in {:?}: {err}", self.state());
            self.advance(PipelineState::Failed(err.kind()));
        }
        result
    }

    fn stamp_request(&mut self, bytes: &[u8]) -> Result<Stamped, EngineError> {
        let engine = self.engine;
        let config = &engine.config;
        let request = self.request;

        let descriptor = engine.registry.get(&request.template_type)?;
        let mut layout = BandLayout::resolve(&request.template_type, descriptor)?;
        let mut xlsx = XlsxDocument::load_with_limits(bytes, engine.limits)?;
        let valid = request.validate(&xlsx.document.sheet, &layout)?;
        self.advance(PipelineState::Validated);

        let ProvisionOutcome { inserted, cleared } = provision(
            &mut xlsx.document,
            &mut layout,
            valid.bag_count,
            config.max_bags,
        )?;
        log::debug!(
            "band of template {:?} holds {} bags ({inserted} inserted, {cleared} cleared)",
            layout.template,
            layout.active_rows
        );
        self.advance(PipelineState::Provisioned);

        let seed = valid.seed.unwrap_or_else(|| rand::rng().random());
        let plan = self.distribute(&valid, &layout, seed)?;
        self.advance(PipelineState::Distributed);

        let options = StampOptions {
            number_format: &config.number_format,
            date_format: &config.date_format,
            weight_font: &config.weight_font,
            preserve_wrapping: valid.preserve_wrapping,
        };
        stamp(&mut xlsx.document, &layout, &plan, &valid.metadata, &options)?;
        self.advance(PipelineState::Stamped);

        let locale = config.locale();
        let projection = project(&xlsx.document, &layout, &locale, Some(seed));
        let rendering = request
            .render_text
            .then(|| render_text(&xlsx.document, &config.render, &locale));

        Ok(Stamped {
            xlsx,
            valid,
            plan,
            seed,
            projection,
            rendering,
        })
    }

    fn distribute(
        &self,
        valid: &ValidatedRequest,
        layout: &BandLayout,
        seed: u64,
    ) -> Result<WeightPlan, EngineError> {
        let config = &self.engine.config;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let options = DistributeOptions {
            max_retries: config.max_retries,
            tolerance_percent: config.tolerance_percent,
        };
        let plan = distribute_with_rng(
            valid.target_weight,
            layout.active_rows,
            valid.band,
            options,
            &mut rng,
        )?;
        log::debug!(
            "distributed {} over {} bags with seed {seed} in {} attempt(s){}",
            valid.target_weight,
            plan.len(),
            plan.attempts,
            if plan.rebalanced { ", rebalanced" } else { "" }
        );
        Ok(plan)
    }
}

/// `<stem>_processed.xlsx` for an uploaded file name.
pub fn suggested_filename(upload: Option<&str>) -> String {
    let stem = upload
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STEM);
    format!("{stem}_processed.xlsx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filenames_keep_the_upload_stem() {
        assert_eq!(suggested_filename(Some("march.xlsx")), "march_processed.xlsx");
        assert_eq!(
            suggested_filename(Some("uploads/lot 7.xlsx")),
            "lot 7_processed.xlsx"
        );
        assert_eq!(suggested_filename(None), "invoice_processed.xlsx");
        assert_eq!(suggested_filename(Some("")), "invoice_processed.xlsx");
    }

    #[test]
    fn failures_are_recorded_in_the_trace() {
        let engine = Engine::default();
        let request = ProcessingRequest {
            template_type: "nope".into(),
            ..ProcessingRequest::default()
        };
        let mut pipeline = Pipeline::new(&engine, &request);
        let result = pipeline.stamp_request(b"not a workbook");
        let err = pipeline.settle(result).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownTemplateError);
        assert_eq!(
            pipeline.trace(),
            &[
                PipelineState::Received,
                PipelineState::Failed(ErrorKind::UnknownTemplateError)
            ]
        );
    }

    #[test]
    fn unreadable_input_fails_with_a_format_error() {
        let engine = Engine::default();
        let request = ProcessingRequest::default();
        let err = engine.preview(b"plain text", &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatError);
    }
}
