//! Clicked vertices and canned analysis responses around Chiang Mai.

use std::cell::RefCell;
use std::collections::VecDeque;

use survey_canvas::analysis::{AnalysisRequest, AnalysisResponse, Statistics};
use survey_canvas::error::AnalysisError;
use survey_canvas::geometry::{Bounds, Point};
use survey_canvas::traits::AnalysisProvider;

/// A named plot outline as (lng, lat) vertices, unclosed.
#[derive(Debug, Clone)]
pub struct Plot {
    pub name: &'static str,
    pub vertices: &'static [(f64, f64)],
}

impl Plot {
    pub fn points(&self) -> Vec<Point> {
        self.vertices
            .iter()
            .map(|(lng, lat)| Point::new(*lng, *lat).expect("fixture coordinates are valid"))
            .collect()
    }
}

// ============================================================================
// Plots
// ============================================================================

pub const TRIANGLE_PLOT: Plot = Plot {
    name: "San Sai triangle",
    vertices: &[(98.0, 18.0), (98.1, 18.0), (98.1, 18.1)],
};

pub const RICE_FIELD: Plot = Plot {
    name: "Mae Rim rice field",
    vertices: &[
        (98.9442, 18.9127),
        (98.9511, 18.9129),
        (98.9514, 18.9078),
        (98.9447, 18.9071),
    ],
};

pub const ORCHARD: Plot = Plot {
    name: "Doi Saket longan orchard",
    vertices: &[
        (99.1601, 18.8702),
        (99.1655, 18.8711),
        (99.1679, 18.8667),
        (99.1640, 18.8631),
        (99.1592, 18.8660),
    ],
};

pub const CHIANG_MAI_REGION: &str = "Chiang Mai";

// ============================================================================
// Responses
// ============================================================================

pub fn tile_response(tile_url: &str) -> AnalysisResponse {
    AnalysisResponse {
        tile_url: Some(tile_url.to_string()),
        bounds: Bounds::enclosing(&RICE_FIELD.points()),
        statistics: Some(Statistics {
            mean: Some(0.52),
            min: Some(0.21),
            max: Some(0.78),
            std_dev: Some(0.09),
        }),
        interpretation: Some("Moderate vegetation".to_string()),
        ..AnalysisResponse::default()
    }
}

/// Returns queued results in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedAnalysis {
    results: RefCell<VecDeque<Result<AnalysisResponse, AnalysisError>>>,
    requests: RefCell<Vec<AnalysisRequest>>,
}

impl ScriptedAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, response: AnalysisResponse) -> Self {
        self.results.borrow_mut().push_back(Ok(response));
        self
    }

    pub fn then_status(self, status: u16, detail: &str) -> Self {
        self.results.borrow_mut().push_back(Err(AnalysisError::Status {
            status,
            detail: detail.to_string(),
        }));
        self
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.borrow().clone()
    }
}

impl AnalysisProvider for ScriptedAnalysis {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        self.requests.borrow_mut().push(request.clone());
        self.results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(AnalysisError::Status {
                status: 500,
                detail: "no scripted response left".to_string(),
            }))
    }
}
