use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{render::Rgba, timeline::TimingEntry, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub visualizer: VisualizerConfig,
    pub reveal: RevealConfig,
    pub gesture: GestureConfig,
    pub ceremony: CeremonyConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Analysis window size. Frames carry `fft_size / 2` bins.
    pub fft_size: usize,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Cadence of position-change notifications while playing.
    pub position_interval_ms: u64,
    pub asset_path: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 128,
            min_decibels: -100.0,
            max_decibels: -30.0,
            position_interval_ms: 250,
            asset_path: "audio/al-fatihah.wav".to_string(),
        }
    }
}

impl AudioConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub width: f32,
    pub height: f32,
    /// Fraction of the canvas height a full-scale bin reaches.
    pub height_scale: f32,
    pub gap: f32,
    pub base_color: Rgba,
    pub tip_color: Rgba,
    pub refresh_hz: u32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 80.0,
            height_scale: 0.9,
            gap: 1.0,
            base_color: Rgba::new(212, 175, 55, 0.3),
            tip_color: Rgba::new(212, 175, 55, 0.9),
            refresh_hz: 60,
        }
    }
}

impl VisualizerConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPolicyKind {
    PositionIndexed,
    IntervalTimer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub policy: RevealPolicyKind,
    pub timings: Vec<TimingEntry>,
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        let timings = [5.0, 11.0, 18.0, 26.0, 33.0, 40.0, 47.0]
            .into_iter()
            .enumerate()
            .map(|(order, offset)| TimingEntry::new(order, offset))
            .collect();

        Self {
            policy: RevealPolicyKind::PositionIndexed,
            timings,
            initial_delay_ms: 5_000,
            interval_ms: 6_500,
        }
    }
}

impl RevealConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How a drawn signature turns into a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CompletionPolicy {
    /// Completion only through an explicit `confirm()`, gated on a non-empty pad.
    ExplicitConfirm,
    /// Completion a fixed delay after the last stroke ends. The pad is locked
    /// while the delay runs.
    AutoConfirm { delay_ms: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub completion: CompletionPolicy,
    pub surface_width: f32,
    pub surface_height: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            completion: CompletionPolicy::ExplicitConfirm,
            surface_width: 576.0,
            surface_height: 192.0,
        }
    }
}

/// What a manual toggle does once the recitation has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    PlaybackOnly,
    RestartSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonyConfig {
    pub content_id: String,
    pub auto_start_delay_ms: u64,
    pub replay: ReplayPolicy,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            content_id: "surah/1".to_string(),
            auto_start_delay_ms: 500,
            replay: ReplayPolicy::PlaybackOnly,
        }
    }
}

impl CeremonyConfig {
    pub fn auto_start_delay(&self) -> Duration {
        Duration::from_millis(self.auto_start_delay_ms)
    }
}
