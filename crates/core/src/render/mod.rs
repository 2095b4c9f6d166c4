//! Bar-chart visualizer driven by the display refresh cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FrequencyFrame, FrequencySampler, Result, VisualizerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Vertical gradient running from `start` at `from_y` to `end` at `to_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearGradient {
    pub from_y: f32,
    pub to_y: f32,
    pub start: Rgba,
    pub end: Rgba,
}

/// One filled bin. `y` is the top edge; bars grow up from the canvas floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: LinearGradient,
}

/// Paint target for the visualizer.
pub trait Canvas {
    fn clear(&mut self, width: f32, height: f32);
    fn fill_bar(&mut self, bar: &Bar);
}

/// Canvas that keeps the most recent frame and counts paint calls.
#[derive(Debug, Default, Clone)]
pub struct RecordingCanvas {
    pub clears: usize,
    pub fills: usize,
    pub bars: Vec<Bar>,
}

impl Canvas for RecordingCanvas {
    fn clear(&mut self, _width: f32, _height: f32) {
        self.clears += 1;
        self.bars.clear();
    }

    fn fill_bar(&mut self, bar: &Bar) {
        self.fills += 1;
        self.bars.push(*bar);
    }
}

/// Lays a frame out as bars across the configured canvas.
pub fn layout_bars(frame: &FrequencyFrame, config: &VisualizerConfig) -> Vec<Bar> {
    if frame.is_empty() {
        return Vec::new();
    }

    let slot = config.width / frame.len() as f32;
    let full_scale = f32::from(FrequencyFrame::MAX_MAGNITUDE);
    frame
        .bins
        .iter()
        .enumerate()
        .map(|(index, magnitude)| {
            let height = f32::from(*magnitude) / full_scale * config.height * config.height_scale;
            let top = config.height - height;
            Bar {
                x: slot * index as f32,
                y: top,
                width: (slot - config.gap).max(0.0),
                height,
                fill: LinearGradient {
                    from_y: config.height,
                    to_y: top,
                    start: config.base_color,
                    end: config.tip_color,
                },
            }
        })
        .collect()
}

/// Cancellable repeating task at the display refresh rate. At most one
/// refresh fires per poll; missed refreshes are dropped rather than replayed.
#[derive(Debug, Clone)]
pub struct FrameLoop {
    interval: Duration,
    accumulated: Duration,
    active: bool,
}

impl FrameLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Schedules the next refresh immediately.
    pub fn start(&mut self) {
        self.active = true;
        self.accumulated = self.interval;
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.accumulated = Duration::ZERO;
    }

    pub fn poll(&mut self, elapsed: Duration) -> bool {
        if !self.active {
            return false;
        }

        self.accumulated += elapsed;
        if self.accumulated < self.interval {
            return false;
        }
        self.accumulated = if self.interval.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.accumulated.as_nanos() % self.interval.as_nanos()) as u64)
        };
        true
    }
}

#[derive(Debug)]
pub struct VisualizerRenderer {
    config: VisualizerConfig,
    frame_loop: FrameLoop,
    frames_painted: u64,
}

impl VisualizerRenderer {
    pub fn new(config: VisualizerConfig) -> Self {
        let frame_loop = FrameLoop::new(config.frame_interval());
        Self {
            config,
            frame_loop,
            frames_painted: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.is_active()
    }

    pub fn frames_painted(&self) -> u64 {
        self.frames_painted
    }

    pub fn start(&mut self) {
        if !self.frame_loop.is_active() {
            tracing::debug!("visualizer loop started");
            self.frame_loop.start();
        }
    }

    pub fn stop(&mut self) {
        if self.frame_loop.is_active() {
            tracing::debug!(frames = self.frames_painted, "visualizer loop cancelled");
            self.frame_loop.cancel();
        }
    }

    /// Called with the time since the previous call. Paints when a refresh is
    /// due and the loop is active; returns whether a frame was painted.
    pub fn on_refresh<C: Canvas>(
        &mut self,
        elapsed: Duration,
        sampler: &mut FrequencySampler,
        canvas: &mut C,
    ) -> Result<bool> {
        if !self.frame_loop.poll(elapsed) {
            return Ok(false);
        }

        let frame = sampler.sample()?;
        self.paint(&frame, canvas);
        Ok(true)
    }

    /// Replaces whatever is on the canvas with `frame`.
    pub fn paint<C: Canvas>(&mut self, frame: &FrequencyFrame, canvas: &mut C) {
        canvas.clear(self.config.width, self.config.height);
        for bar in layout_bars(frame, &self.config) {
            canvas.fill_bar(&bar);
        }
        self.frames_painted += 1;
    }
}
