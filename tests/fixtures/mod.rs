//! Test fixtures for survey-canvas.
//!
//! Provides:
//! - Farm plot corners around Chiang Mai used as click sequences
//! - A scripted analysis provider that records requests

pub mod chiang_mai_plots;

pub use chiang_mai_plots::*;
