//! Vector preview of the drawing session on the map.
//!
//! Every pass removes all preview artifacts this synchronizer created and
//! then re-adds exactly those the current session calls for. The artifacts
//! are tracked in a registry of owned ids rather than probed on the map, so
//! re-rendering the same session never duplicates a layer.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::drawing::{DrawingSession, DrawingState};
use crate::error::LayerSyncError;
use crate::geometry::{Point, Polygon};
use crate::listener::Listener;
use crate::traits::{EventKind, LayerKind, LayerSpec, ListenerId, MapAdapter, PaintValue, SourceSpec};

pub const POINTS_SOURCE: &str = "drawing-points-source";
pub const SHAPE_SOURCE: &str = "drawing-shape-source";
pub const POINTS_LAYER: &str = "drawing-points";
pub const LINE_LAYER: &str = "drawing-line";
pub const FILL_LAYER: &str = "drawing-fill";
pub const OUTLINE_LAYER: &str = "drawing-outline";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Consecutive failed passes before the failure is surfaced.
    pub max_sync_retries: u32,
    /// Vertex and line colour while drawing.
    pub drawing_color: String,
    /// Fill, outline and vertex colour of a completed polygon.
    pub completed_color: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_sync_retries: 3,
            drawing_color: "#fbb03b".to_string(),
            completed_color: "#3bb2d0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The map now shows the session.
    Rendered,
    /// Waiting for the next style-ready signal.
    Deferred,
}

#[derive(Debug)]
pub struct VectorPreviewSynchronizer {
    config: PreviewConfig,
    owned_sources: Vec<String>,
    owned_layers: Vec<String>,
    /// Latest session that could not be rendered yet.
    pending: Option<DrawingSession>,
    ready_listener: Option<Listener>,
    failed_passes: u32,
}

impl VectorPreviewSynchronizer {
    pub fn new(config: PreviewConfig) -> Self {
        Self {
            config,
            owned_sources: Vec::new(),
            owned_layers: Vec::new(),
            pending: None,
            ready_listener: None,
            failed_passes: 0,
        }
    }

    pub fn owned_layers(&self) -> &[String] {
        &self.owned_layers
    }

    pub fn owned_sources(&self) -> &[String] {
        &self.owned_sources
    }

    pub fn is_deferred(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether `id` is this synchronizer's style-ready subscription.
    pub fn handles(&self, id: ListenerId) -> bool {
        self.ready_listener
            .as_ref()
            .is_some_and(|listener| listener.matches(id))
    }

    /// Brings the map's preview artifacts in line with `session`.
    ///
    /// Only fails once `max_sync_retries` consecutive passes were rejected by
    /// the map; earlier failures are logged and retried on the next
    /// style-ready signal.
    pub fn sync<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        session: &DrawingSession,
    ) -> Result<SyncStatus, LayerSyncError> {
        if !map.is_style_loaded() {
            debug!(state = ?session.state(), "style not loaded, deferring preview");
            self.defer(map, session);
            return Ok(SyncStatus::Deferred);
        }

        match self.render(map, session) {
            Ok(()) => {
                self.failed_passes = 0;
                self.pending = None;
                if let Some(listener) = self.ready_listener.take() {
                    listener.release(map);
                }
                Ok(SyncStatus::Rendered)
            }
            Err(err) => {
                self.failed_passes += 1;
                warn!(error = %err, attempt = self.failed_passes, "preview sync failed");
                if self.failed_passes >= self.config.max_sync_retries {
                    let attempts = self.failed_passes;
                    self.failed_passes = 0;
                    self.pending = None;
                    if let Some(listener) = self.ready_listener.take() {
                        listener.release(map);
                    }
                    self.remove_owned(map);
                    return Err(LayerSyncError::RetriesExhausted { attempts });
                }
                self.defer(map, session);
                Ok(SyncStatus::Deferred)
            }
        }
    }

    /// Handles the one-shot style-ready signal: releases the subscription and
    /// renders whatever session was pending when it fired.
    pub fn on_style_ready<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
    ) -> Result<SyncStatus, LayerSyncError> {
        if let Some(listener) = self.ready_listener.take() {
            listener.release(map);
        }
        match self.pending.take() {
            Some(session) => self.sync(map, &session),
            None => Ok(SyncStatus::Rendered),
        }
    }

    /// Removes every preview artifact and the pending subscription.
    pub fn teardown<M: MapAdapter + ?Sized>(mut self, map: &mut M) {
        self.pending = None;
        if let Some(listener) = self.ready_listener.take() {
            listener.release(map);
        }
        self.remove_owned(map);
    }

    fn defer<M: MapAdapter + ?Sized>(&mut self, map: &mut M, session: &DrawingSession) {
        self.pending = Some(session.clone());
        if self.ready_listener.is_none() {
            self.ready_listener = Some(Listener::subscribe(map, EventKind::StyleLoad));
        }
    }

    fn render<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        session: &DrawingSession,
    ) -> Result<(), LayerSyncError> {
        self.remove_owned(map);

        match session.state() {
            DrawingState::Idle => {}
            DrawingState::Drawing => {
                let points = session.points();
                if points.len() >= 2 {
                    self.add_source(map, SHAPE_SOURCE, line_feature(points))?;
                    self.add_layer(map, self.line_layer())?;
                }
                if !points.is_empty() {
                    self.add_source(map, POINTS_SOURCE, point_features(points))?;
                    self.add_layer(map, self.vertex_layer(6.0, &self.config.drawing_color))?;
                }
            }
            DrawingState::Completed => {
                if let Some(polygon) = session.polygon() {
                    self.add_source(map, SHAPE_SOURCE, polygon_feature(polygon))?;
                    self.add_layer(map, self.fill_layer())?;
                    self.add_layer(map, self.outline_layer())?;
                    self.add_source(map, POINTS_SOURCE, point_features(polygon.exterior().vertices()))?;
                    self.add_layer(map, self.vertex_layer(5.0, &self.config.completed_color))?;
                }
            }
        }

        debug!(
            state = ?session.state(),
            layers = self.owned_layers.len(),
            "preview rendered"
        );
        Ok(())
    }

    /// Layers first, then sources. Ids still present on the map after a
    /// failed removal stay registered.
    fn remove_owned<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        for id in std::mem::take(&mut self.owned_layers).into_iter().rev() {
            if let Err(err) = map.remove_layer(&id) {
                debug!(layer = %id, error = %err, "preview layer removal failed");
                if map.layer(&id).is_some() {
                    self.owned_layers.push(id);
                }
            }
        }
        for id in std::mem::take(&mut self.owned_sources).into_iter().rev() {
            if let Err(err) = map.remove_source(&id) {
                debug!(source = %id, error = %err, "preview source removal failed");
                if map.has_source(&id) {
                    self.owned_sources.push(id);
                }
            }
        }
    }

    fn add_source<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        id: &str,
        data: Value,
    ) -> Result<(), LayerSyncError> {
        map.add_source(id, SourceSpec::GeoJson { data })
            .map_err(|err| LayerSyncError::map(id, err))?;
        self.owned_sources.push(id.to_string());
        Ok(())
    }

    fn add_layer<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        layer: LayerSpec,
    ) -> Result<(), LayerSyncError> {
        let id = layer.id.clone();
        map.add_layer(layer).map_err(|err| LayerSyncError::map(&id, err))?;
        self.owned_layers.push(id);
        Ok(())
    }

    fn vertex_layer(&self, radius: f64, color: &str) -> LayerSpec {
        LayerSpec::new(POINTS_LAYER, LayerKind::Circle, POINTS_SOURCE)
            .paint("circle-radius", PaintValue::Number(radius))
            .paint("circle-color", PaintValue::Color(color.to_string()))
            .paint("circle-stroke-width", PaintValue::Number(2.0))
            .paint("circle-stroke-color", PaintValue::Color("#fff".to_string()))
    }

    fn line_layer(&self) -> LayerSpec {
        LayerSpec::new(LINE_LAYER, LayerKind::Line, SHAPE_SOURCE)
            .paint("line-color", PaintValue::Color(self.config.drawing_color.clone()))
            .paint("line-width", PaintValue::Number(2.0))
            .paint("line-dasharray", PaintValue::Numbers(vec![2.0, 2.0]))
    }

    fn fill_layer(&self) -> LayerSpec {
        LayerSpec::new(FILL_LAYER, LayerKind::Fill, SHAPE_SOURCE)
            .paint("fill-color", PaintValue::Color(self.config.completed_color.clone()))
            .paint("fill-opacity", PaintValue::Number(0.2))
    }

    fn outline_layer(&self) -> LayerSpec {
        LayerSpec::new(OUTLINE_LAYER, LayerKind::Line, SHAPE_SOURCE)
            .paint("line-color", PaintValue::Color(self.config.completed_color.clone()))
            .paint("line-width", PaintValue::Number(3.0))
    }
}

fn point_features(points: &[Point]) -> Value {
    let features = points
        .iter()
        .map(|point| {
            json!({
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "Point", "coordinates": point },
            })
        })
        .collect::<Vec<_>>();
    json!({ "type": "FeatureCollection", "features": features })
}

/// Open line through the clicked points; never closed while drawing.
fn line_feature(points: &[Point]) -> Value {
    json!({
        "type": "Feature",
        "properties": {},
        "geometry": { "type": "LineString", "coordinates": points },
    })
}

fn polygon_feature(polygon: &Polygon) -> Value {
    json!({
        "type": "Feature",
        "properties": {},
        "geometry": polygon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::DrawingStateMachine;
    use crate::memory_map::MemoryMap;

    fn p(lng: f64, lat: f64) -> Point {
        Point::new(lng, lat).unwrap()
    }

    fn drawing_with(points: &[Point]) -> DrawingStateMachine {
        let mut machine = DrawingStateMachine::new();
        machine.start_drawing();
        for point in points {
            machine.add_point(*point);
        }
        machine
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn test_idle_and_empty_drawing_have_no_artifacts() {
        let mut map = MemoryMap::new();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        preview.sync(&mut map, &DrawingSession::default()).unwrap();
        assert!(map.layer_ids().is_empty());

        let machine = drawing_with(&[]);
        preview.sync(&mut map, machine.session()).unwrap();
        assert!(map.layer_ids().is_empty());
        assert!(map.source_ids().is_empty());
    }

    #[test]
    fn test_single_point_shows_marker_only() {
        let mut map = MemoryMap::new();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        let machine = drawing_with(&[p(1.0, 1.0)]);
        preview.sync(&mut map, machine.session()).unwrap();
        assert_eq!(map.layer_ids(), vec![POINTS_LAYER.to_string()]);
        assert_eq!(map.source_ids(), vec![POINTS_SOURCE.to_string()]);
    }

    #[test]
    fn test_line_stays_open_while_drawing() {
        let mut map = MemoryMap::new();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        let machine = drawing_with(&[p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)]);
        preview.sync(&mut map, machine.session()).unwrap();

        assert_eq!(
            sorted(map.layer_ids()),
            sorted(vec![LINE_LAYER.to_string(), POINTS_LAYER.to_string()])
        );
        let Some(SourceSpec::GeoJson { data }) = map.source(SHAPE_SOURCE) else {
            panic!("line source missing");
        };
        let coordinates = data["geometry"]["coordinates"].as_array().unwrap();
        assert_eq!(coordinates.len(), 3);
        assert_ne!(coordinates.first(), coordinates.last());
    }

    #[test]
    fn test_completed_polygon_artifacts() {
        let mut map = MemoryMap::new();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        let mut machine = drawing_with(&[p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)]);
        machine.finish_drawing().unwrap();
        preview.sync(&mut map, machine.session()).unwrap();

        assert_eq!(
            sorted(map.layer_ids()),
            sorted(vec![
                FILL_LAYER.to_string(),
                OUTLINE_LAYER.to_string(),
                POINTS_LAYER.to_string(),
            ])
        );
        let Some(SourceSpec::GeoJson { data }) = map.source(POINTS_SOURCE) else {
            panic!("vertex source missing");
        };
        assert_eq!(data["features"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_resync_is_idempotent() {
        let mut map = MemoryMap::new();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        let machine = drawing_with(&[p(0.0, 0.0), p(1.0, 0.0)]);
        preview.sync(&mut map, machine.session()).unwrap();
        let (layers, sources) = (map.layer_ids(), map.source_ids());

        assert_eq!(preview.sync(&mut map, machine.session()).unwrap(), SyncStatus::Rendered);
        assert_eq!(map.layer_ids().len(), layers.len());
        assert_eq!(sorted(map.layer_ids()), sorted(layers));
        assert_eq!(sorted(map.source_ids()), sorted(sources));
    }

    #[test]
    fn test_deferred_until_style_ready_renders_latest() {
        let mut map = MemoryMap::loading();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        let mut machine = drawing_with(&[p(0.0, 0.0)]);
        assert_eq!(preview.sync(&mut map, machine.session()).unwrap(), SyncStatus::Deferred);
        machine.add_point(p(1.0, 0.0));
        assert_eq!(preview.sync(&mut map, machine.session()).unwrap(), SyncStatus::Deferred);

        let ready = map.finish_style_load();
        assert_eq!(ready.len(), 1, "one readiness subscription regardless of changes");
        assert!(preview.handles(ready[0]));

        preview.on_style_ready(&mut map).unwrap();
        assert!(!preview.is_deferred());
        assert_eq!(map.subscription_count(), 0);
        let Some(SourceSpec::GeoJson { data }) = map.source(POINTS_SOURCE) else {
            panic!("points source missing");
        };
        assert_eq!(data["features"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_failures_exhaust_retries() {
        let mut map = MemoryMap::new();
        map.reject_layer(POINTS_LAYER);
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig {
            max_sync_retries: 2,
            ..PreviewConfig::default()
        });
        let machine = drawing_with(&[p(0.0, 0.0)]);

        assert_eq!(preview.sync(&mut map, machine.session()).unwrap(), SyncStatus::Deferred);
        let err = preview.sync(&mut map, machine.session()).unwrap_err();
        assert_eq!(err, LayerSyncError::RetriesExhausted { attempts: 2 });
        assert!(map.source_ids().is_empty());
    }

    #[test]
    fn test_teardown_removes_everything() {
        let mut map = MemoryMap::new();
        let mut preview = VectorPreviewSynchronizer::new(PreviewConfig::default());
        let machine = drawing_with(&[p(0.0, 0.0), p(1.0, 0.0)]);
        preview.sync(&mut map, machine.session()).unwrap();
        preview.teardown(&mut map);
        assert!(map.layer_ids().is_empty());
        assert!(map.source_ids().is_empty());
    }
}
