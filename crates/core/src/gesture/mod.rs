//! Signature capture on a 2D drawing surface.
//!
//! [`GestureCapture`] is a small state machine fed with pointer or touch
//! coordinates. It reports two typed events: [`GestureEvent::SigningStarted`]
//! the first time a stroke begins in a drawing session, and
//! [`GestureEvent::Completed`] exactly once when the signature is accepted.

use std::{fmt::Write as _, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{config::CompletionPolicy, GestureConfig, Result};

/// Surface-relative coordinate in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Observable pad state. `has_started` flips once per drawing session,
/// `is_empty` flips on the first stroke point; both reset on `clear()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureState {
    pub is_empty: bool,
    pub has_started: bool,
}

impl Default for SignatureState {
    fn default() -> Self {
        Self {
            is_empty: true,
            has_started: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapturePhase {
    /// Accepting strokes.
    Drawing,
    /// Auto-confirm countdown running; edits are refused.
    Locked { remaining: Duration },
    /// Completion already emitted for this session.
    Completed,
}

/// Opaque copy of the drawn path handed out with the completion event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSnapshot {
    pub width: f32,
    pub height: f32,
    pub strokes: Vec<Vec<Point>>,
}

impl SignatureSnapshot {
    pub fn point_count(&self) -> usize {
        self.strokes.iter().map(Vec::len).sum()
    }

    /// Renders the strokes as an SVG path `d` attribute.
    pub fn to_svg_path(&self) -> String {
        let mut path = String::new();
        for stroke in &self.strokes {
            let mut points = stroke.iter();
            if let Some(first) = points.next() {
                let _ = write!(path, "M{:.1} {:.1}", first.x, first.y);
                for point in points {
                    let _ = write!(path, " L{:.1} {:.1}", point.x, point.y);
                }
                path.push(' ');
            }
        }
        path.trim_end().to_string()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    /// First stroke of the drawing session; used to trigger an ambient cue.
    SigningStarted,
    Completed(SignatureSnapshot),
}

#[derive(Debug)]
pub struct GestureCapture {
    policy: CompletionPolicy,
    width: f32,
    height: f32,
    state: SignatureState,
    phase: CapturePhase,
    strokes: Vec<Vec<Point>>,
    stroke_open: bool,
}

impl GestureCapture {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            policy: config.completion,
            width: config.surface_width,
            height: config.surface_height,
            state: SignatureState::default(),
            phase: CapturePhase::Drawing,
            strokes: Vec::new(),
            stroke_open: false,
        }
    }

    pub fn state(&self) -> SignatureState {
        self.state
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty
    }

    pub fn strokes(&self) -> &[Vec<Point>] {
        &self.strokes
    }

    /// Whether the confirm control should be enabled.
    pub fn can_confirm(&self) -> bool {
        !self.state.is_empty && self.phase == CapturePhase::Drawing
    }

    pub fn begin_stroke(&mut self, point: Point) -> Option<GestureEvent> {
        if self.phase != CapturePhase::Drawing {
            tracing::debug!(phase = ?self.phase, "ignoring stroke on a locked pad");
            return None;
        }

        let started = !self.state.has_started;
        self.state.has_started = true;
        self.state.is_empty = false;
        self.strokes.push(vec![point]);
        self.stroke_open = true;

        if started {
            tracing::info!("signing started");
            Some(GestureEvent::SigningStarted)
        } else {
            None
        }
    }

    pub fn extend_stroke(&mut self, point: Point) {
        if !self.stroke_open {
            return;
        }
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push(point);
        }
    }

    pub fn end_stroke(&mut self) {
        if !self.stroke_open {
            return;
        }
        self.stroke_open = false;

        if let CompletionPolicy::AutoConfirm { delay_ms } = self.policy {
            if !self.state.is_empty {
                tracing::debug!(delay_ms, "pad locked pending auto-confirm");
                self.phase = CapturePhase::Locked {
                    remaining: Duration::from_millis(delay_ms),
                };
            }
        }
    }

    /// Erases everything and starts a new drawing session. Aborts any open
    /// stroke and any pending auto-confirm.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.stroke_open = false;
        self.state = SignatureState::default();
        self.phase = CapturePhase::Drawing;
    }

    /// Accepts the signature. A no-op on an empty pad and after the session
    /// has already completed.
    pub fn confirm(&mut self) -> Option<GestureEvent> {
        if self.state.is_empty {
            tracing::debug!("confirm ignored on empty pad");
            return None;
        }
        if self.phase == CapturePhase::Completed {
            tracing::debug!("confirm ignored after completion");
            return None;
        }
        Some(self.complete())
    }

    /// Advances the auto-confirm countdown.
    pub fn tick(&mut self, elapsed: Duration) -> Option<GestureEvent> {
        let CapturePhase::Locked { remaining } = self.phase else {
            return None;
        };

        match remaining.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => {
                self.phase = CapturePhase::Locked { remaining: left };
                None
            }
            _ => Some(self.complete()),
        }
    }

    fn complete(&mut self) -> GestureEvent {
        self.stroke_open = false;
        self.phase = CapturePhase::Completed;
        let snapshot = SignatureSnapshot {
            width: self.width,
            height: self.height,
            strokes: self.strokes.clone(),
        };
        tracing::info!(points = snapshot.point_count(), "signature completed");
        GestureEvent::Completed(snapshot)
    }
}
