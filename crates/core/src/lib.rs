//! Core library for the signing ceremony.
//!
//! A signature drawn on [`gesture::GestureCapture`] unlocks a narrated
//! recitation. While it plays, [`FrequencySampler`] snapshots the spectrum
//! for [`VisualizerRenderer`] and [`RevealScheduler`] maps playback position
//! (or elapsed time) onto the content list. [`CeremonyOrchestrator`] wires the
//! pieces together and is stepped explicitly by the host, which keeps every
//! subsystem deterministic under test.

pub mod analysis;
pub mod audio;
pub mod ceremony;
pub mod config;
pub mod content;
pub mod error;
pub mod gesture;
pub mod render;
pub mod timeline;

pub use analysis::{FrequencyFrame, FrequencySampler, SignalTap};
pub use audio::{
    AudioEvent, AudioOutput, BufferedOutput, PlaybackController, PlaybackSession, ToggleOutcome,
};
pub use ceremony::{CeremonyEvent, CeremonyOrchestrator, CeremonyState, SessionHandoff};
pub use config::{
    AppConfig, AudioConfig, CeremonyConfig, GestureConfig, RevealConfig, VisualizerConfig,
};
pub use content::{
    revealed_segments, ContentProvider, ContentSegment, ContentState, EditionsFileProvider,
    StaticContentProvider,
};
pub use error::{CeremonyError, Result};
pub use gesture::{GestureCapture, GestureEvent, Point, SignatureSnapshot, SignatureState};
pub use render::{Bar, Canvas, FrameLoop, RecordingCanvas, Rgba, VisualizerRenderer};
pub use timeline::{
    IntervalTimerReveal, PositionIndexedReveal, RevealScheduler, TimingEntry, VisibleCursor,
};
