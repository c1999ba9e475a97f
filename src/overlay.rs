//! Raster overlay lifecycle, one slot per analysis index type.
//!
//! Each slot owns at most one raster source/layer pair on the map. The slot
//! registry, not the map, is the record of what is mounted; any failed add
//! leaves the slot unmounted so the next call retries from a clean state.
//!
//! While any slot holds a tile URL the manager keeps a style-load
//! subscription. Each style load drops every layer on the map, so the
//! handler reconciles the registry and re-adds the visible overlays.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::LayerSyncError;
use crate::geometry::Bounds;
use crate::listener::Listener;
use crate::traits::{EventKind, IndexType, LayerKind, LayerSpec, ListenerId, MapAdapter, PaintValue, SourceSpec};

const OPACITY_PROPERTY: &str = "raster-opacity";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Opacity of a slot before anyone sets it.
    pub default_opacity: f64,
    /// Fit the map to the bounds of each accepted analysis result.
    pub fit_to_bounds: bool,
    pub fit_padding: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            min_zoom: 0,
            max_zoom: 22,
            default_opacity: 0.7,
            fit_to_bounds: true,
            fit_padding: 50,
        }
    }
}

/// A mounted raster overlay as seen from outside the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub tile_url: String,
    pub bounds: Option<Bounds>,
    pub opacity: f64,
    pub visible: bool,
    pub source_id: String,
    pub layer_id: String,
}

#[derive(Debug, Clone)]
struct Slot {
    /// Newest tile URL, kept while hidden so it can be re-added.
    tile_url: Option<String>,
    bounds: Option<Bounds>,
    opacity: f64,
    visible: bool,
    mounted: bool,
}

pub fn source_id(slot: IndexType) -> String {
    format!("overlay-{}-source", slot.key())
}

pub fn layer_id(slot: IndexType) -> String {
    format!("overlay-{}-layer", slot.key())
}

#[derive(Debug)]
pub struct OverlayLayerManager {
    config: OverlayConfig,
    slots: BTreeMap<IndexType, Slot>,
    style_listener: Option<Listener>,
}

impl OverlayLayerManager {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            slots: BTreeMap::new(),
            style_listener: None,
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// The slot's mounted overlay, if any.
    pub fn layer(&self, slot: IndexType) -> Option<OverlayLayer> {
        let state = self.slots.get(&slot)?;
        if !state.mounted {
            return None;
        }
        Some(OverlayLayer {
            tile_url: state.tile_url.clone()?,
            bounds: state.bounds,
            opacity: state.opacity,
            visible: state.visible,
            source_id: source_id(slot),
            layer_id: layer_id(slot),
        })
    }

    /// Tile URL of the slot's newest result, mounted or not.
    pub fn tile_url(&self, slot: IndexType) -> Option<&str> {
        self.slots.get(&slot)?.tile_url.as_deref()
    }

    pub fn opacity(&self, slot: IndexType) -> f64 {
        self.slots
            .get(&slot)
            .map_or(self.config.default_opacity, |state| state.opacity)
    }

    pub fn is_visible(&self, slot: IndexType) -> bool {
        self.slots.get(&slot).is_none_or(|state| state.visible)
    }

    /// Whether `id` is this manager's style-load subscription.
    pub fn handles(&self, id: ListenerId) -> bool {
        self.style_listener
            .as_ref()
            .is_some_and(|listener| listener.matches(id))
    }

    /// Reconciles the registry with the map after a style load and re-adds
    /// every visible slot that has a tile URL but no layer. Returns the first
    /// failure; the other slots are still attempted.
    pub fn on_style_ready<M: MapAdapter + ?Sized>(&mut self, map: &mut M) -> Result<(), LayerSyncError> {
        let slots = self.slots.keys().copied().collect::<Vec<_>>();
        let mut first_err = None;
        for slot in slots {
            let state = self.slot_mut(slot);
            if state.mounted && map.layer(&layer_id(slot)).is_none() {
                debug!(%slot, "overlay layer lost with the style");
                state.mounted = false;
            }
            if !state.visible || state.mounted || state.tile_url.is_none() {
                continue;
            }
            self.unmount(map, slot);
            if let Err(err) = self.mount(map, slot) {
                first_err.get_or_insert(err);
            }
        }
        self.track_style(map);
        first_err.map_or(Ok(()), Err)
    }

    /// Replaces the slot's overlay with a new tile URL.
    ///
    /// Safe to repeat: the end state is one raster layer for the slot using
    /// the newest URL, or none while the slot is hidden.
    pub fn set_overlay<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        slot: IndexType,
        tile_url: &str,
        bounds: Option<Bounds>,
    ) -> Result<(), LayerSyncError> {
        let state = self.slot_mut(slot);
        state.tile_url = Some(tile_url.to_string());
        state.bounds = bounds;
        let visible = state.visible;

        self.unmount(map, slot);
        self.track_style(map);
        if !visible {
            debug!(%slot, "overlay stored while hidden");
            return Ok(());
        }
        self.mount(map, slot)
    }

    /// Hiding removes the layer and source outright; showing re-adds the
    /// newest tile URL if there is one.
    pub fn set_visible<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        slot: IndexType,
        visible: bool,
    ) -> Result<(), LayerSyncError> {
        let state = self.slot_mut(slot);
        state.visible = visible;
        let needs_mount = visible && !state.mounted && state.tile_url.is_some();

        if !visible {
            self.unmount(map, slot);
            return Ok(());
        }
        if needs_mount {
            return self.mount(map, slot);
        }
        Ok(())
    }

    /// Updates opacity in place; the source is never reloaded. Stored for
    /// later if the slot has no layer yet.
    pub fn set_opacity<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        slot: IndexType,
        value: f64,
    ) -> Result<(), LayerSyncError> {
        if !value.is_finite() {
            warn!(%slot, value, "ignoring non-finite opacity");
            return Ok(());
        }
        let opacity = value.clamp(0.0, 1.0);
        let state = self.slot_mut(slot);
        state.opacity = opacity;
        if !state.mounted {
            return Ok(());
        }

        let id = layer_id(slot);
        if let Err(err) = map.set_paint_property(&id, OPACITY_PROPERTY, PaintValue::Number(opacity)) {
            if map.layer(&id).is_none() {
                self.slot_mut(slot).mounted = false;
            }
            return Err(LayerSyncError::map(id, err));
        }
        Ok(())
    }

    /// Removes every slot's overlay and forgets their tile URLs. Opacity and
    /// visibility preferences survive.
    pub fn clear<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        let slots = self.slots.keys().copied().collect::<Vec<_>>();
        for slot in slots {
            self.unmount(map, slot);
            let state = self.slot_mut(slot);
            state.tile_url = None;
            state.bounds = None;
        }
        self.track_style(map);
    }

    /// Removes everything this manager owns. Tolerates artifacts that are
    /// already gone.
    pub fn teardown<M: MapAdapter + ?Sized>(mut self, map: &mut M) {
        let slots = self.slots.keys().copied().collect::<Vec<_>>();
        for slot in slots {
            self.unmount(map, slot);
        }
        if let Some(listener) = self.style_listener.take() {
            listener.release(map);
        }
        debug!("overlay manager torn down");
    }

    /// Holds the style-load subscription exactly while some slot has an
    /// overlay to restore.
    fn track_style<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        let wanted = self.slots.values().any(|state| state.tile_url.is_some());
        match (wanted, self.style_listener.take()) {
            (true, None) => {
                self.style_listener = Some(Listener::subscribe(map, EventKind::StyleLoad));
            }
            (true, Some(listener)) => self.style_listener = Some(listener),
            (false, Some(listener)) => listener.release(map),
            (false, None) => {}
        }
    }

    fn slot_mut(&mut self, slot: IndexType) -> &mut Slot {
        let default_opacity = self.config.default_opacity;
        self.slots.entry(slot).or_insert_with(|| Slot {
            tile_url: None,
            bounds: None,
            opacity: default_opacity,
            visible: true,
            mounted: false,
        })
    }

    fn mount<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        slot: IndexType,
    ) -> Result<(), LayerSyncError> {
        let (source, layer) = (source_id(slot), layer_id(slot));
        let config = self.config.clone();
        let state = self.slot_mut(slot);
        let Some(tile_url) = state.tile_url.clone() else {
            return Ok(());
        };
        state.mounted = false;

        let raster = SourceSpec::Raster {
            tiles: vec![tile_url.clone()],
            tile_size: config.tile_size,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
        };
        if let Err(err) = map.add_source(&source, raster) {
            warn!(%slot, error = %err, "overlay source add failed");
            return Err(LayerSyncError::map(source, err));
        }

        let spec = LayerSpec::new(&layer, LayerKind::Raster, &source)
            .paint(OPACITY_PROPERTY, PaintValue::Number(state.opacity))
            .paint("raster-fade-duration", PaintValue::Number(0.0));
        if let Err(err) = map.add_layer(spec) {
            warn!(%slot, error = %err, "overlay layer add failed");
            if let Err(cleanup) = map.remove_source(&source) {
                debug!(%slot, error = %cleanup, "overlay source cleanup failed");
            }
            return Err(LayerSyncError::map(layer, err));
        }

        state.mounted = true;
        info!(%slot, %tile_url, "overlay mounted");
        Ok(())
    }

    fn unmount<M: MapAdapter + ?Sized>(&mut self, map: &mut M, slot: IndexType) {
        let (source, layer) = (source_id(slot), layer_id(slot));
        if let Err(err) = map.remove_layer(&layer) {
            debug!(%slot, error = %err, "overlay layer removal skipped");
        }
        if let Err(err) = map.remove_source(&source) {
            debug!(%slot, error = %err, "overlay source removal skipped");
        }
        if let Some(state) = self.slots.get_mut(&slot) {
            state.mounted = false;
        }
    }
}
