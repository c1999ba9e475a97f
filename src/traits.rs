//! Capability boundaries for the drawing/overlay core.
//!
//! The core never touches a concrete map widget or HTTP stack directly. Hosts
//! implement [`MapAdapter`] for their canvas and [`AnalysisProvider`] for the
//! analysis backend; tests substitute in-memory fakes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisRequest, AnalysisResponse};
use crate::error::{AnalysisError, MapError};
use crate::geometry::{Bounds, Point};

/// Minimal capability set required from the host map canvas.
///
/// Style readiness is asynchronous and single-shot per style load: callers
/// check [`MapAdapter::is_style_loaded`] and otherwise subscribe to
/// [`EventKind::StyleLoad`], never poll.
pub trait MapAdapter {
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<(), MapError>;

    fn remove_source(&mut self, id: &str) -> Result<(), MapError>;

    fn has_source(&self, id: &str) -> bool;

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), MapError>;

    fn remove_layer(&mut self, id: &str) -> Result<(), MapError>;

    fn layer(&self, id: &str) -> Option<LayerSpec>;

    fn set_paint_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: PaintValue,
    ) -> Result<(), MapError>;

    /// Registers interest in an event kind. The host later delivers matching
    /// events tagged with the returned id.
    fn subscribe(&mut self, kind: EventKind) -> ListenerId;

    fn unsubscribe(&mut self, id: ListenerId);

    fn is_style_loaded(&self) -> bool;

    fn fit_bounds(&mut self, bounds: Bounds, padding: u32);

    /// Visual hint only; no contract on map contents.
    fn set_cursor(&mut self, cursor: Cursor);
}

/// Produces analysis imagery and statistics for a geometry or preset region.
pub trait AnalysisProvider {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// Identifies one event subscription on a map canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    StyleLoad,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    Click(Point),
    StyleLoad,
    Error(String),
}

impl MapEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::Click(_) => EventKind::Click,
            MapEvent::StyleLoad => EventKind::StyleLoad,
            MapEvent::Error(_) => EventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Crosshair,
}

/// Data backing one or more layers, in map-style terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    GeoJson {
        data: serde_json::Value,
    },
    Raster {
        tiles: Vec<String>,
        #[serde(rename = "tileSize")]
        tile_size: u32,
        #[serde(rename = "minzoom")]
        min_zoom: u8,
        #[serde(rename = "maxzoom")]
        max_zoom: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Circle,
    Line,
    Fill,
    Raster,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PaintValue {
    Number(f64),
    Color(String),
    Numbers(Vec<f64>),
}

impl PaintValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PaintValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub source: String,
    pub paint: BTreeMap<String, PaintValue>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, kind: LayerKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            paint: BTreeMap::new(),
        }
    }

    pub fn paint(mut self, name: &str, value: PaintValue) -> Self {
        self.paint.insert(name.to_string(), value);
        self
    }
}

/// Analysis index type. Each one owns a single overlay slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexType {
    #[default]
    Ndvi,
    Spi,
    Ndmi,
}

impl IndexType {
    pub const ALL: [IndexType; 3] = [IndexType::Ndvi, IndexType::Spi, IndexType::Ndmi];

    /// Path prefix of this index's endpoints under the analysis base URL.
    pub fn path_prefix(self) -> &'static str {
        match self {
            IndexType::Ndvi => "",
            IndexType::Spi => "spi/",
            IndexType::Ndmi => "ndmi/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexType::Ndvi => "NDVI",
            IndexType::Spi => "SPI",
            IndexType::Ndmi => "NDMI",
        }
    }

    /// Lowercase key used in map source/layer ids.
    pub fn key(self) -> &'static str {
        match self {
            IndexType::Ndvi => "ndvi",
            IndexType::Spi => "spi",
            IndexType::Ndmi => "ndmi",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_source_style_json() {
        let source = SourceSpec::Raster {
            tiles: vec!["https://tiles/{z}/{x}/{y}".to_string()],
            tile_size: 256,
            min_zoom: 0,
            max_zoom: 22,
        };
        let value = serde_json::to_value(&source).unwrap();
        assert_eq!(value["type"], "raster");
        assert_eq!(value["tileSize"], 256);
        assert_eq!(value["maxzoom"], 22);
    }

    #[test]
    fn test_geojson_source_tag() {
        let source = SourceSpec::GeoJson {
            data: serde_json::json!({"type": "FeatureCollection", "features": []}),
        };
        let value = serde_json::to_value(&source).unwrap();
        assert_eq!(value["type"], "geojson");
    }

    #[test]
    fn test_index_type_serde_names() {
        assert_eq!(serde_json::to_string(&IndexType::Ndmi).unwrap(), "\"NDMI\"");
        let parsed: IndexType = serde_json::from_str("\"SPI\"").unwrap();
        assert_eq!(parsed, IndexType::Spi);
        assert_eq!(IndexType::Spi.path_prefix(), "spi/");
    }
}
