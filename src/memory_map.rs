//! In-memory map canvas (fallback/fake when no real map widget is present).
//!
//! Mirrors the rules a style-based web map enforces: unique source and layer
//! ids, layers must reference an existing source, a source cannot be removed
//! while a layer uses it, and nothing can be mutated before the style loads.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::MapError;
use crate::geometry::Bounds;
use crate::traits::{Cursor, EventKind, LayerSpec, ListenerId, MapAdapter, PaintValue, SourceSpec};

#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    style_loaded: bool,
    sources: BTreeMap<String, SourceSpec>,
    /// Layers in draw order, bottom first.
    layers: Vec<LayerSpec>,
    subscriptions: BTreeMap<ListenerId, EventKind>,
    next_listener: u64,
    cursor: Cursor,
    last_fit: Option<(Bounds, u32)>,
    rejected_layers: BTreeSet<String>,
    source_adds: usize,
    layer_adds: usize,
}

impl MemoryMap {
    /// A canvas whose style is already loaded.
    pub fn new() -> Self {
        Self {
            style_loaded: true,
            ..Self::default()
        }
    }

    /// A canvas still waiting for its style.
    pub fn loading() -> Self {
        Self::default()
    }

    /// Marks the style as loaded and returns the listeners that should now
    /// receive [`MapEvent::StyleLoad`](crate::traits::MapEvent::StyleLoad).
    pub fn finish_style_load(&mut self) -> Vec<ListenerId> {
        self.style_loaded = true;
        self.listeners_for(EventKind::StyleLoad)
    }

    /// Simulates a style switch: every source and layer is dropped.
    pub fn reset_style(&mut self) {
        self.style_loaded = false;
        self.sources.clear();
        self.layers.clear();
    }

    pub fn listeners_for(&self, kind: EventKind) -> Vec<ListenerId> {
        self.subscriptions
            .iter()
            .filter(|(_, subscribed)| **subscribed == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_subscribed(&self, id: ListenerId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Makes every future `add_layer` with this id fail.
    pub fn reject_layer(&mut self, id: &str) {
        self.rejected_layers.insert(id.to_string());
    }

    pub fn accept_layer(&mut self, id: &str) {
        self.rejected_layers.remove(id);
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.id.clone()).collect()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn last_fit(&self) -> Option<(Bounds, u32)> {
        self.last_fit
    }

    /// Total number of successful `add_source` calls.
    pub fn source_adds(&self) -> usize {
        self.source_adds
    }

    /// Total number of successful `add_layer` calls.
    pub fn layer_adds(&self) -> usize {
        self.layer_adds
    }

    fn ensure_loaded(&self) -> Result<(), MapError> {
        if self.style_loaded {
            Ok(())
        } else {
            Err(MapError::StyleNotLoaded)
        }
    }
}

impl MapAdapter for MemoryMap {
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<(), MapError> {
        self.ensure_loaded()?;
        if self.sources.contains_key(id) {
            return Err(MapError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), source);
        self.source_adds += 1;
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), MapError> {
        self.ensure_loaded()?;
        if let Some(layer) = self.layers.iter().find(|layer| layer.source == id) {
            return Err(MapError::SourceInUse {
                source_id: id.to_string(),
                layer_id: layer.id.clone(),
            });
        }
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MapError::MissingSource(id.to_string()))
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), MapError> {
        self.ensure_loaded()?;
        if self.rejected_layers.contains(&layer.id) {
            return Err(MapError::Rejected(format!("layer {:?} refused", layer.id)));
        }
        if self.layers.iter().any(|existing| existing.id == layer.id) {
            return Err(MapError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(MapError::MissingSource(layer.source));
        }
        self.layers.push(layer);
        self.layer_adds += 1;
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), MapError> {
        self.ensure_loaded()?;
        let position = self
            .layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or_else(|| MapError::MissingLayer(id.to_string()))?;
        self.layers.remove(position);
        Ok(())
    }

    fn layer(&self, id: &str) -> Option<LayerSpec> {
        self.layers.iter().find(|layer| layer.id == id).cloned()
    }

    fn set_paint_property(
        &mut self,
        layer_id: &str,
        name: &str,
        value: PaintValue,
    ) -> Result<(), MapError> {
        self.ensure_loaded()?;
        let layer = self
            .layers
            .iter_mut()
            .find(|layer| layer.id == layer_id)
            .ok_or_else(|| MapError::MissingLayer(layer_id.to_string()))?;
        layer.paint.insert(name.to_string(), value);
        Ok(())
    }

    fn subscribe(&mut self, kind: EventKind) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.subscriptions.insert(id, kind);
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) {
        self.subscriptions.remove(&id);
    }

    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding: u32) {
        self.last_fit = Some((bounds, padding));
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LayerKind;

    fn geojson() -> SourceSpec {
        SourceSpec::GeoJson {
            data: serde_json::json!({"type": "FeatureCollection", "features": []}),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut map = MemoryMap::new();
        map.add_source("s", geojson()).unwrap();
        assert_eq!(
            map.add_source("s", geojson()),
            Err(MapError::DuplicateSource("s".to_string()))
        );
        map.add_layer(LayerSpec::new("l", LayerKind::Fill, "s")).unwrap();
        assert_eq!(
            map.add_layer(LayerSpec::new("l", LayerKind::Fill, "s")),
            Err(MapError::DuplicateLayer("l".to_string()))
        );
    }

    #[test]
    fn test_source_in_use_cannot_be_removed() {
        let mut map = MemoryMap::new();
        map.add_source("s", geojson()).unwrap();
        map.add_layer(LayerSpec::new("l", LayerKind::Line, "s")).unwrap();
        assert!(matches!(map.remove_source("s"), Err(MapError::SourceInUse { .. })));
        map.remove_layer("l").unwrap();
        map.remove_source("s").unwrap();
        assert!(map.source_ids().is_empty());
    }

    #[test]
    fn test_mutation_refused_before_style_load() {
        let mut map = MemoryMap::loading();
        assert_eq!(map.add_source("s", geojson()), Err(MapError::StyleNotLoaded));
        let listener = map.subscribe(EventKind::StyleLoad);
        assert_eq!(map.finish_style_load(), vec![listener]);
        assert!(map.add_source("s", geojson()).is_ok());
    }

    #[test]
    fn test_layer_requires_source() {
        let mut map = MemoryMap::new();
        assert_eq!(
            map.add_layer(LayerSpec::new("l", LayerKind::Raster, "missing")),
            Err(MapError::MissingSource("missing".to_string()))
        );
    }
}
