//! Drawing session state machine.
//!
//! `Idle -> Drawing -> Completed`, with `clear` returning to `Idle` from any
//! state. Stray input (clicks outside a drawing, a second start while one is
//! in progress) is ignored rather than rejected; only finishing with too few
//! vertices is an error, because it would produce an invalid ring.

use thiserror::Error;
use tracing::{debug, info};

use crate::error::InsufficientPointsError;
use crate::geometry::{Point, Polygon, Ring};

/// Minimum number of clicked vertices for a polygon.
pub const MIN_VERTICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawingState {
    #[default]
    Idle,
    Drawing,
    Completed,
}

/// The single drawing session of one map instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawingSession {
    state: DrawingState,
    points: Vec<Point>,
    polygon: Option<Polygon>,
}

impl DrawingSession {
    pub fn state(&self) -> DrawingState {
        self.state
    }

    /// Vertices clicked so far; empty unless drawing.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The closed polygon; present only once completed.
    pub fn polygon(&self) -> Option<&Polygon> {
        self.polygon.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FinishError {
    #[error("no drawing is in progress")]
    NotDrawing,
    #[error(transparent)]
    InsufficientPoints(#[from] InsufficientPointsError),
}

#[derive(Debug, Default)]
pub struct DrawingStateMachine {
    session: DrawingSession,
}

impl DrawingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &DrawingSession {
        &self.session
    }

    pub fn state(&self) -> DrawingState {
        self.session.state
    }

    /// Begins a new drawing, discarding any previous points or polygon.
    ///
    /// Returns `false` (and leaves the session alone) if a drawing is already
    /// in progress.
    pub fn start_drawing(&mut self) -> bool {
        if self.session.state == DrawingState::Drawing {
            debug!("start ignored: already drawing");
            return false;
        }
        self.session = DrawingSession {
            state: DrawingState::Drawing,
            points: Vec::new(),
            polygon: None,
        };
        info!("started drawing");
        true
    }

    /// Appends a vertex. Ignored unless drawing; returns whether it was kept.
    pub fn add_point(&mut self, point: Point) -> bool {
        if self.session.state != DrawingState::Drawing {
            debug!(?point, state = ?self.session.state, "point ignored");
            return false;
        }
        self.session.points.push(point);
        debug!(?point, count = self.session.points.len(), "added point");
        true
    }

    /// Closes the clicked vertices into a polygon.
    ///
    /// With fewer than [`MIN_VERTICES`] points the session is left untouched.
    pub fn finish_drawing(&mut self) -> Result<&Polygon, FinishError> {
        if self.session.state != DrawingState::Drawing {
            return Err(FinishError::NotDrawing);
        }
        let points = self.session.points.len();
        if points < MIN_VERTICES {
            return Err(InsufficientPointsError { points }.into());
        }
        let ring = Ring::close(&self.session.points)
            .map_err(|_| InsufficientPointsError { points })?;

        self.session.points.clear();
        self.session.state = DrawingState::Completed;
        info!(vertices = points, "finished drawing");
        Ok(&*self.session.polygon.insert(Polygon::new(ring)))
    }

    pub fn clear(&mut self) {
        self.session = DrawingSession::default();
        debug!("cleared drawing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lng: f64, lat: f64) -> Point {
        Point::new(lng, lat).unwrap()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let machine = DrawingStateMachine::new();
        assert_eq!(machine.state(), DrawingState::Idle);
        assert!(machine.session().points().is_empty());
        assert!(machine.session().polygon().is_none());
    }

    #[test]
    fn test_add_point_ignored_when_idle() {
        let mut machine = DrawingStateMachine::new();
        assert!(!machine.add_point(p(1.0, 1.0)));
        assert_eq!(machine.session(), &DrawingSession::default());
    }

    #[test]
    fn test_finish_with_two_points_keeps_session() {
        let mut machine = DrawingStateMachine::new();
        machine.start_drawing();
        machine.add_point(p(0.0, 0.0));
        machine.add_point(p(1.0, 0.0));
        let before = machine.session().clone();

        let err = machine.finish_drawing().unwrap_err();
        assert_eq!(err, FinishError::InsufficientPoints(InsufficientPointsError { points: 2 }));
        assert_eq!(machine.session(), &before);
        assert_eq!(machine.state(), DrawingState::Drawing);
    }

    #[test]
    fn test_finish_closes_ring() {
        let mut machine = DrawingStateMachine::new();
        machine.start_drawing();
        for point in [p(98.0, 18.0), p(98.1, 18.0), p(98.1, 18.1), p(98.0, 18.1)] {
            machine.add_point(point);
        }
        let ring = machine.finish_drawing().unwrap().exterior().clone();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.positions()[0], ring.positions()[4]);
        assert_eq!(machine.state(), DrawingState::Completed);
    }

    #[test]
    fn test_finish_outside_drawing() {
        let mut machine = DrawingStateMachine::new();
        assert_eq!(machine.finish_drawing().unwrap_err(), FinishError::NotDrawing);
    }

    #[test]
    fn test_restart_from_completed_discards_polygon() {
        let mut machine = DrawingStateMachine::new();
        machine.start_drawing();
        for point in [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)] {
            machine.add_point(point);
        }
        machine.finish_drawing().unwrap();
        assert!(machine.start_drawing());
        assert!(machine.session().polygon().is_none());
        assert_eq!(machine.state(), DrawingState::Drawing);
    }

    #[test]
    fn test_second_start_keeps_points() {
        let mut machine = DrawingStateMachine::new();
        machine.start_drawing();
        machine.add_point(p(0.0, 0.0));
        assert!(!machine.start_drawing());
        assert_eq!(machine.session().points().len(), 1);
    }

    #[test]
    fn test_clear_from_any_state() {
        let mut machine = DrawingStateMachine::new();
        machine.start_drawing();
        machine.add_point(p(0.0, 0.0));
        machine.clear();
        assert_eq!(machine.session(), &DrawingSession::default());
        machine.clear();
        assert_eq!(machine.state(), DrawingState::Idle);
    }
}
