//! Wires map events, the drawing session, its preview, analysis requests and
//! the overlay slots together for one map instance.
//!
//! All methods run on the host's single event-loop thread. Analysis fetches
//! are split into [`Workbench::begin_analysis`] and
//! [`Workbench::complete_analysis`] so the host can run them however it
//! likes; responses overtaken by a newer request for the same slot are
//! discarded on completion.

use std::collections::BTreeMap;
use std::mem;

use tracing::{debug, info, warn};

use crate::analysis::{AnalysisRequest, AnalysisResponse, AnalysisTarget, DateRange};
use crate::config::SurveyConfig;
use crate::drawing::{DrawingSession, DrawingStateMachine, FinishError};
use crate::error::{AnalysisError, LayerSyncError};
use crate::geometry::Polygon;
use crate::listener::Listener;
use crate::overlay::OverlayLayerManager;
use crate::preview::{SyncStatus, VectorPreviewSynchronizer};
use crate::tokens::{RequestToken, RequestTokens};
use crate::traits::{AnalysisProvider, Cursor, EventKind, IndexType, ListenerId, MapAdapter, MapEvent};

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Transient hint, e.g. too few points to finish.
    Prompt(String),
    /// Dismissible error banner.
    Banner(String),
}

/// An issued analysis request awaiting its response.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTicket {
    pub slot: IndexType,
    pub token: RequestToken,
    pub request: AnalysisRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Applied(AnalysisResponse),
    Failed(String),
    /// A newer request for the slot was issued (or the workbench was
    /// cleared) before this response arrived.
    Stale,
}

#[derive(Debug)]
pub struct Workbench {
    drawing: DrawingStateMachine,
    preview: VectorPreviewSynchronizer,
    overlays: OverlayLayerManager,
    tokens: RequestTokens,
    index_type: IndexType,
    date_range: DateRange,
    results: BTreeMap<IndexType, AnalysisResponse>,
    notices: Vec<Notice>,
    click_listener: Option<Listener>,
    error_listener: Option<Listener>,
}

impl Workbench {
    pub fn new(config: SurveyConfig) -> Self {
        Self {
            drawing: DrawingStateMachine::new(),
            preview: VectorPreviewSynchronizer::new(config.preview),
            overlays: OverlayLayerManager::new(config.overlay),
            tokens: RequestTokens::new(),
            index_type: IndexType::default(),
            date_range: DateRange::default(),
            results: BTreeMap::new(),
            notices: Vec::new(),
            click_listener: None,
            error_listener: None,
        }
    }

    /// Subscribes to map clicks and errors. Calling it again is a no-op.
    pub fn attach<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        if self.click_listener.is_none() {
            self.click_listener = Some(Listener::subscribe(map, EventKind::Click));
        }
        if self.error_listener.is_none() {
            self.error_listener = Some(Listener::subscribe(map, EventKind::Error));
        }
        self.sync_preview(map);
    }

    /// Dispatches an event the host received for `listener`. Returns whether
    /// one of this workbench's subscriptions consumed it.
    pub fn handle_event<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        listener: ListenerId,
        event: MapEvent,
    ) -> bool {
        match event {
            MapEvent::StyleLoad if self.preview.handles(listener) => {
                let result = self.preview.on_style_ready(map);
                self.absorb_sync(result);
                true
            }
            MapEvent::StyleLoad if self.overlays.handles(listener) => {
                if let Err(err) = self.overlays.on_style_ready(map) {
                    warn!(error = %err, "overlays not restored after style load");
                }
                true
            }
            MapEvent::Click(point) if owns(&self.click_listener, listener) => {
                if self.drawing.add_point(point) {
                    self.sync_preview(map);
                }
                true
            }
            MapEvent::Error(message) if owns(&self.error_listener, listener) => {
                warn!(%message, "map reported an error");
                true
            }
            other => {
                debug!(?listener, kind = ?other.kind(), "event not handled");
                false
            }
        }
    }

    pub fn session(&self) -> &DrawingSession {
        self.drawing.session()
    }

    pub fn overlays(&self) -> &OverlayLayerManager {
        &self.overlays
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn set_index_type(&mut self, index_type: IndexType) {
        self.index_type = index_type;
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn set_date_range(&mut self, date_range: DateRange) {
        self.date_range = date_range;
    }

    /// Latest accepted analysis result for a slot.
    pub fn result(&self, slot: IndexType) -> Option<&AnalysisResponse> {
        self.results.get(&slot)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        mem::take(&mut self.notices)
    }

    pub fn start_drawing<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        if self.drawing.start_drawing() {
            map.set_cursor(Cursor::Crosshair);
            self.sync_preview(map);
        }
    }

    pub fn finish_drawing<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
    ) -> Result<Polygon, FinishError> {
        match self.drawing.finish_drawing() {
            Ok(polygon) => {
                let polygon = polygon.clone();
                map.set_cursor(Cursor::Default);
                self.sync_preview(map);
                Ok(polygon)
            }
            Err(FinishError::InsufficientPoints(err)) => {
                self.notices.push(Notice::Prompt(
                    "Please add at least 3 points to create a polygon".to_string(),
                ));
                Err(err.into())
            }
            Err(err) => Err(err),
        }
    }

    /// Drops the drawing, every overlay and every in-flight request.
    pub fn clear<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        self.drawing.clear();
        map.set_cursor(Cursor::Default);
        self.sync_preview(map);
        self.overlays.clear(map);
        self.tokens.invalidate_all();
        self.results.clear();
        info!("workbench cleared");
    }

    /// Issues a request for the completed polygon under the current index
    /// type and date range. Prompts the user and returns `None` when nothing
    /// has been drawn.
    pub fn begin_analysis(&mut self) -> Option<AnalysisTicket> {
        let Some(polygon) = self.drawing.session().polygon() else {
            self.notices.push(Notice::Prompt(
                "Please draw a polygon on the map first".to_string(),
            ));
            return None;
        };
        let target = AnalysisTarget::Polygon(polygon.clone());
        Some(self.issue(target))
    }

    /// Issues a request for a preset study area under the current index type
    /// and date range.
    pub fn begin_region_analysis(&mut self, study_area: &str) -> AnalysisTicket {
        self.issue(AnalysisTarget::Region(study_area.to_string()))
    }

    /// Applies a response unless a newer request for the same slot has been
    /// issued since. Failures become a banner and leave every slot and the
    /// drawing untouched.
    pub fn complete_analysis<M: MapAdapter + ?Sized>(
        &mut self,
        map: &mut M,
        ticket: AnalysisTicket,
        result: Result<AnalysisResponse, AnalysisError>,
    ) -> AnalysisOutcome {
        let slot = ticket.slot;
        if !self.tokens.is_current(slot, ticket.token) {
            debug!(%slot, token = ticket.token.value(), "stale analysis response discarded");
            return AnalysisOutcome::Stale;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(%slot, error = %err, "analysis request failed");
                let message = format!("Error calculating {slot}: {err}");
                self.notices.push(Notice::Banner(message.clone()));
                return AnalysisOutcome::Failed(message);
            }
        };

        if let Some(tile_url) = &response.tile_url {
            if let Err(err) = self.overlays.set_overlay(map, slot, tile_url, response.bounds) {
                warn!(%slot, error = %err, "overlay not applied");
            }
        }
        if self.overlays.config().fit_to_bounds {
            if let Some(bounds) = response.bounds {
                map.fit_bounds(bounds, self.overlays.config().fit_padding);
            }
        }

        info!(%slot, token = ticket.token.value(), "analysis applied");
        self.results.insert(slot, response.clone());
        AnalysisOutcome::Applied(response)
    }

    /// Runs one polygon analysis to completion on the calling thread.
    pub fn analyze<M, A>(&mut self, map: &mut M, provider: &A) -> Option<AnalysisOutcome>
    where
        M: MapAdapter + ?Sized,
        A: AnalysisProvider + ?Sized,
    {
        let ticket = self.begin_analysis()?;
        let result = provider.analyze(&ticket.request);
        Some(self.complete_analysis(map, ticket, result))
    }

    /// Runs one preset-region analysis to completion on the calling thread.
    pub fn analyze_region<M, A>(&mut self, map: &mut M, provider: &A, study_area: &str) -> AnalysisOutcome
    where
        M: MapAdapter + ?Sized,
        A: AnalysisProvider + ?Sized,
    {
        let ticket = self.begin_region_analysis(study_area);
        let result = provider.analyze(&ticket.request);
        self.complete_analysis(map, ticket, result)
    }

    pub fn set_opacity<M: MapAdapter + ?Sized>(&mut self, map: &mut M, slot: IndexType, value: f64) {
        if let Err(err) = self.overlays.set_opacity(map, slot, value) {
            warn!(%slot, error = %err, "opacity not applied");
        }
    }

    pub fn set_visible<M: MapAdapter + ?Sized>(&mut self, map: &mut M, slot: IndexType, visible: bool) {
        if let Err(err) = self.overlays.set_visible(map, slot, visible) {
            warn!(%slot, error = %err, "visibility not applied");
        }
    }

    /// Releases every subscription and removes everything drawn on the map.
    /// Consumes the workbench, so it runs exactly once.
    pub fn teardown<M: MapAdapter + ?Sized>(mut self, map: &mut M) {
        if let Some(listener) = self.click_listener.take() {
            listener.release(map);
        }
        if let Some(listener) = self.error_listener.take() {
            listener.release(map);
        }
        map.set_cursor(Cursor::Default);
        self.preview.teardown(map);
        self.overlays.teardown(map);
        info!("workbench torn down");
    }

    fn issue(&mut self, target: AnalysisTarget) -> AnalysisTicket {
        let slot = self.index_type;
        let token = self.tokens.issue(slot);
        debug!(%slot, token = token.value(), "analysis requested");
        AnalysisTicket {
            slot,
            token,
            request: AnalysisRequest {
                index_type: slot,
                date_range: self.date_range,
                target,
            },
        }
    }

    fn sync_preview<M: MapAdapter + ?Sized>(&mut self, map: &mut M) {
        let result = self.preview.sync(map, self.drawing.session());
        self.absorb_sync(result);
    }

    fn absorb_sync(&mut self, result: Result<SyncStatus, LayerSyncError>) {
        match result {
            Ok(status) => debug!(?status, "preview synchronized"),
            Err(err) => {
                warn!(error = %err, "preview could not be drawn");
                self.notices.push(Notice::Banner(err.to_string()));
            }
        }
    }
}

fn owns(listener: &Option<Listener>, id: ListenerId) -> bool {
    listener.as_ref().is_some_and(|listener| listener.matches(id))
}
