//! Compiled pipeline states.

use crate::backend::GpuPipeline;

/// Whether a pipeline rasterizes or dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// A compiled graphics or compute pipeline.
#[derive(Debug)]
pub struct PipelineState {
    pipeline: GpuPipeline,
    kind: PipelineKind,
    label: Option<String>,
}

impl PipelineState {
    pub(crate) fn new(pipeline: GpuPipeline, kind: PipelineKind, label: Option<String>) -> Self {
        Self {
            pipeline,
            kind,
            label,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The backend pipeline.
    pub fn raw(&self) -> &GpuPipeline {
        &self.pipeline
    }
}
