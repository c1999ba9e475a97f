//! survey-canvas core
//!
//! Interactive area-of-interest drawing on a live map canvas, with analysis
//! results shown as raster overlays tied to the drawn area or a preset region.

pub mod traits;
pub mod geometry;
pub mod error;
pub mod listener;
pub mod memory_map;
pub mod drawing;
pub mod preview;
pub mod overlay;
pub mod tokens;
pub mod analysis;
pub mod config;
pub mod workbench;
