//! Error taxonomy shared across the drawing, preview, overlay and analysis
//! layers.

use thiserror::Error;

/// Finishing a drawing was attempted with fewer than three vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("at least 3 points are needed to close a polygon, got {points}")]
pub struct InsufficientPointsError {
    pub points: usize,
}

/// A rejection reported by the host map canvas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("map style is not loaded yet")]
    StyleNotLoaded,
    #[error("source {0:?} already exists")]
    DuplicateSource(String),
    #[error("layer {0:?} already exists")]
    DuplicateLayer(String),
    #[error("source {0:?} does not exist")]
    MissingSource(String),
    #[error("layer {0:?} does not exist")]
    MissingLayer(String),
    #[error("source {source_id:?} is still used by layer {layer_id:?}")]
    SourceInUse { source_id: String, layer_id: String },
    #[error("map rejected the operation: {0}")]
    Rejected(String),
}

/// A map mutation issued while synchronizing preview or overlay artifacts
/// failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerSyncError {
    #[error("failed to sync {artifact:?}: {source}")]
    Map {
        artifact: String,
        #[source]
        source: MapError,
    },
    #[error("map layers could not be synchronized after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl LayerSyncError {
    pub fn map(artifact: impl Into<String>, source: MapError) -> Self {
        LayerSyncError::Map {
            artifact: artifact.into(),
            source,
        }
    }
}

/// The analysis service could not be reached or answered with a failure.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis service returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("analysis response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
