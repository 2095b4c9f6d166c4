use std::{f32::consts::PI, path::Path, time::Duration};

use crate::{AudioConfig, CeremonyError, Result, SignalTap};

/// Notifications raised by the underlying audio output, in the order the
/// output produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioEvent {
    PositionChanged(f32),
    Ended,
}

/// Host audio output for a single narration track.
///
/// Implementations own the source and destination of the audio graph; the
/// controller supplies the analyser ([`SignalTap`]) through [`connect`].
///
/// [`connect`]: AudioOutput::connect
pub trait AudioOutput {
    /// Wires source → analyser → destination. Called at most once per session.
    fn connect(&mut self, analyser: SignalTap) -> Result<()>;

    /// Whether the host suspended the output context (e.g. before any gesture).
    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> Result<()>;

    /// Starts or resumes output. May be rejected by host policy. Restarts
    /// from the beginning when the track had ended.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn position_seconds(&self) -> f32;

    /// Lets `elapsed` wall-clock time pass and reports what happened.
    fn advance(&mut self, elapsed: Duration) -> Vec<AudioEvent>;

    /// Records that the user interacted with the page.
    fn grant_user_gesture(&mut self) {}

    /// Releases the output. Further `play` calls are rejected until
    /// [`reopen`](AudioOutput::reopen).
    fn close(&mut self);

    /// Makes a closed output usable again, rewound and suspended.
    fn reopen(&mut self) -> Result<()>;
}

/// Snapshot of the transport as seen by [`PlaybackController`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackSession {
    pub position_seconds: f32,
    pub is_playing: bool,
    pub has_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Output started. `fresh` marks a start from position zero, including
    /// a replay after the track ended.
    Started { fresh: bool },
    Paused,
    /// Host refused to start; the controller stays paused.
    Rejected,
}

#[derive(Debug)]
enum GraphState {
    Unbuilt,
    Ready(SignalTap),
    Failed,
}

/// Single-track transport wrapping an [`AudioOutput`].
#[derive(Debug)]
pub struct PlaybackController<O: AudioOutput> {
    output: O,
    is_playing: bool,
    has_ended: bool,
    closed: bool,
    window_size: usize,
    graph: GraphState,
}

impl<O: AudioOutput> PlaybackController<O> {
    pub fn new(output: O, config: &AudioConfig) -> Self {
        Self {
            output,
            is_playing: false,
            has_ended: false,
            closed: false,
            window_size: config.fft_size,
            graph: GraphState::Unbuilt,
        }
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession {
            position_seconds: self.position_seconds(),
            is_playing: self.is_playing,
            has_ended: self.has_ended,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn has_ended(&self) -> bool {
        self.has_ended
    }

    /// Current position as reported by the output, not the last
    /// notification.
    pub fn position_seconds(&self) -> f32 {
        self.output.position_seconds().max(0.0)
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Analyser of the audio graph, if it was built successfully.
    pub fn analyser(&self) -> Option<SignalTap> {
        match &self.graph {
            GraphState::Ready(tap) => Some(tap.clone()),
            GraphState::Unbuilt | GraphState::Failed => None,
        }
    }

    pub fn toggle(&mut self) -> ToggleOutcome {
        if self.is_playing {
            self.output.pause();
            self.is_playing = false;
            tracing::info!(position = self.position_seconds(), "playback paused");
            return ToggleOutcome::Paused;
        }

        let fresh = self.has_ended || self.position_seconds() <= 0.0;
        self.ensure_graph();

        if self.output.is_suspended() {
            if let Err(err) = self.output.resume() {
                tracing::warn!(%err, "could not resume suspended audio output");
                return ToggleOutcome::Rejected;
            }
        }

        match self.output.play() {
            Ok(()) => {
                self.is_playing = true;
                self.has_ended = false;
                tracing::info!(fresh, "playback started");
                ToggleOutcome::Started { fresh }
            }
            Err(err) => {
                self.is_playing = false;
                tracing::warn!(%err, "playback start rejected");
                ToggleOutcome::Rejected
            }
        }
    }

    /// Natural end of the track. Repeated calls have no further effect.
    pub fn on_ended(&mut self) {
        if !self.has_ended {
            tracing::info!(position = self.position_seconds(), "playback ended");
        }
        self.is_playing = false;
        self.has_ended = true;
    }

    /// Advances the output and folds its events into the session. Events are
    /// returned unchanged and in order so that downstream consumers see every
    /// boundary crossing.
    pub fn pump(&mut self, elapsed: Duration) -> Vec<AudioEvent> {
        let events = self.output.advance(elapsed);
        if events.contains(&AudioEvent::Ended) {
            self.on_ended();
        }
        events
    }

    /// Releases the output and forgets the session. The graph is rebuilt on
    /// the next start.
    pub fn teardown(&mut self) {
        if self.is_playing {
            self.output.pause();
        }
        self.output.close();
        self.closed = true;
        if let GraphState::Ready(tap) = &self.graph {
            if let Err(err) = tap.clear() {
                tracing::debug!(%err, "analyser buffer not cleared");
            }
        }
        self.graph = GraphState::Unbuilt;
        self.is_playing = false;
        self.has_ended = false;
    }

    /// Reopens the output after [`teardown`](Self::teardown). No effect on a
    /// live session.
    pub fn reopen(&mut self) -> Result<()> {
        if !self.closed {
            return Ok(());
        }
        self.output.reopen()?;
        self.closed = false;
        self.graph = GraphState::Unbuilt;
        tracing::debug!("audio output reopened");
        Ok(())
    }

    fn ensure_graph(&mut self) {
        if !matches!(self.graph, GraphState::Unbuilt) {
            return;
        }

        let tap = SignalTap::new(self.window_size);
        self.graph = match self.output.connect(tap.clone()) {
            Ok(()) => {
                tracing::debug!(window = self.window_size, "audio graph connected");
                GraphState::Ready(tap)
            }
            Err(err) => {
                tracing::warn!(%err, "audio graph unavailable, visualizer disabled");
                GraphState::Failed
            }
        };
    }
}

/// In-memory mono track that behaves like a host media element: it starts
/// suspended, can enforce an autoplay policy, reports position at a fixed
/// cadence and signals the end of the track once.
#[derive(Debug)]
pub struct BufferedOutput {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
    carry: f64,
    playing: bool,
    suspended: bool,
    requires_gesture: bool,
    gesture_granted: bool,
    closed: bool,
    analyser: Option<SignalTap>,
    position_interval: Duration,
    since_notify: Duration,
}

impl BufferedOutput {
    pub fn new(samples: Vec<f32>, sample_rate: u32, config: &AudioConfig) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            cursor: 0,
            carry: 0.0,
            playing: false,
            suspended: true,
            requires_gesture: false,
            gesture_granted: false,
            closed: false,
            analyser: None,
            position_interval: config.position_interval(),
            since_notify: Duration::ZERO,
        }
    }

    /// Decodes a WAV file, mixing all channels down to mono.
    pub fn from_wav(path: impl AsRef<Path>, config: &AudioConfig) -> Result<Self> {
        let mut reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect::<Vec<_>>();

        tracing::info!(
            path = %path.as_ref().display(),
            sample_rate = spec.sample_rate,
            seconds = samples.len() as f32 / spec.sample_rate as f32,
            "decoded narration"
        );
        Ok(Self::new(samples, spec.sample_rate, config))
    }

    /// Speech-like placeholder track of the given length.
    pub fn synthetic(duration: Duration, config: &AudioConfig) -> Self {
        let rate = config.sample_rate as f32;
        let len = (duration.as_secs_f64() * f64::from(config.sample_rate)) as usize;
        let samples = (0..len)
            .map(|n| {
                let t = n as f32 / rate;
                let syllable = (PI * 3.0 * t).sin().abs();
                let voice = (2.0 * PI * 220.0 * t).sin()
                    + 0.5 * (2.0 * PI * 440.0 * t).sin()
                    + 0.25 * (2.0 * PI * 1_320.0 * t).sin();
                0.4 * syllable * voice
            })
            .collect();
        Self::new(samples, config.sample_rate, config)
    }

    /// Rejects `play` until [`AudioOutput::grant_user_gesture`] is called.
    pub fn with_autoplay_policy(mut self, requires_gesture: bool) -> Self {
        self.requires_gesture = requires_gesture;
        self
    }

    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Plays `elapsed` worth of samples into the analyser.
    fn play_for(&mut self, elapsed: Duration) {
        let wanted = elapsed.as_secs_f64() * f64::from(self.sample_rate) + self.carry;
        let whole = wanted.floor();
        self.carry = wanted - whole;
        let end = (self.cursor + whole as usize).min(self.samples.len());

        if let Some(analyser) = &self.analyser {
            if let Err(err) = analyser.write(&self.samples[self.cursor..end]) {
                tracing::debug!(%err, "dropping analyser block");
            }
        }
        self.cursor = end;
    }
}

impl AudioOutput for BufferedOutput {
    fn connect(&mut self, analyser: SignalTap) -> Result<()> {
        if self.closed {
            return Err(CeremonyError::GraphUnavailable("output closed".to_string()));
        }
        self.analyser = Some(analyser);
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        if self.closed {
            return Err(CeremonyError::PlaybackRejected("output closed".to_string()));
        }
        self.suspended = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.closed {
            return Err(CeremonyError::PlaybackRejected("output closed".to_string()));
        }
        if self.requires_gesture && !self.gesture_granted {
            return Err(CeremonyError::PlaybackRejected(
                "a user gesture is required before playback".to_string(),
            ));
        }
        if self.cursor >= self.samples.len() {
            self.cursor = 0;
            self.carry = 0.0;
        }
        self.playing = true;
        self.since_notify = Duration::ZERO;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn position_seconds(&self) -> f32 {
        self.cursor as f32 / self.sample_rate as f32
    }

    /// Emits one position per elapsed notification interval, however long
    /// `elapsed` is.
    fn advance(&mut self, elapsed: Duration) -> Vec<AudioEvent> {
        let mut events = Vec::new();
        if !self.playing || self.suspended {
            return events;
        }

        let mut budget = elapsed;
        while !budget.is_zero() {
            let until_notify = self.position_interval.saturating_sub(self.since_notify);
            let step = if until_notify.is_zero() {
                budget
            } else {
                budget.min(until_notify)
            };
            budget -= step;
            self.since_notify += step;
            self.play_for(step);

            let finished = self.cursor >= self.samples.len();
            if self.since_notify >= self.position_interval || finished {
                self.since_notify = Duration::ZERO;
                events.push(AudioEvent::PositionChanged(self.position_seconds()));
            }
            if finished {
                self.playing = false;
                events.push(AudioEvent::Ended);
                break;
            }
        }
        events
    }

    fn grant_user_gesture(&mut self) {
        self.gesture_granted = true;
    }

    fn close(&mut self) {
        self.playing = false;
        self.closed = true;
        self.analyser = None;
    }

    fn reopen(&mut self) -> Result<()> {
        self.closed = false;
        self.playing = false;
        self.suspended = true;
        self.cursor = 0;
        self.carry = 0.0;
        self.since_notify = Duration::ZERO;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Output whose behaviour is fully scripted by the test.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedOutput {
        pub reject_play: bool,
        pub reject_resume: bool,
        pub fail_connect: bool,
        pub suspended: bool,
        pub playing: bool,
        pub connects: usize,
        pub resumes: usize,
        pub closed: bool,
        pub position: f32,
        pub queued: Vec<AudioEvent>,
    }

    impl AudioOutput for ScriptedOutput {
        fn connect(&mut self, _analyser: SignalTap) -> Result<()> {
            self.connects += 1;
            if self.fail_connect {
                Err(CeremonyError::GraphUnavailable("scripted".to_string()))
            } else {
                Ok(())
            }
        }

        fn is_suspended(&self) -> bool {
            self.suspended
        }

        fn resume(&mut self) -> Result<()> {
            self.resumes += 1;
            if self.reject_resume {
                return Err(CeremonyError::PlaybackRejected("scripted".to_string()));
            }
            self.suspended = false;
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            if self.reject_play {
                return Err(CeremonyError::PlaybackRejected("scripted".to_string()));
            }
            self.playing = true;
            Ok(())
        }

        fn pause(&mut self) {
            self.playing = false;
        }

        fn position_seconds(&self) -> f32 {
            self.position
        }

        fn advance(&mut self, _elapsed: Duration) -> Vec<AudioEvent> {
            std::mem::take(&mut self.queued)
        }

        fn close(&mut self) {
            self.closed = true;
            self.playing = false;
        }

        fn reopen(&mut self) -> Result<()> {
            self.closed = false;
            self.position = 0.0;
            Ok(())
        }
    }

    fn controller(output: ScriptedOutput) -> PlaybackController<ScriptedOutput> {
        PlaybackController::new(output, &AudioConfig::default())
    }

    #[test]
    fn toggle_alternates_between_playing_and_paused() {
        let mut playback = controller(ScriptedOutput::default());
        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: true });
        assert!(playback.is_playing());
        assert_eq!(playback.toggle(), ToggleOutcome::Paused);
        assert!(!playback.is_playing());
    }

    #[test]
    fn resumes_suspended_output_before_starting() {
        let mut playback = controller(ScriptedOutput {
            suspended: true,
            ..Default::default()
        });
        playback.toggle();
        assert_eq!(playback.output().resumes, 1);
        assert!(playback.output().playing);
    }

    #[test]
    fn rejected_start_leaves_controller_paused() {
        let mut playback = controller(ScriptedOutput {
            reject_play: true,
            ..Default::default()
        });
        assert_eq!(playback.toggle(), ToggleOutcome::Rejected);
        assert!(!playback.is_playing());

        playback.output_mut().reject_play = false;
        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: true });
    }

    #[test]
    fn rejected_resume_leaves_controller_paused() {
        let mut playback = controller(ScriptedOutput {
            suspended: true,
            reject_resume: true,
            ..Default::default()
        });
        assert_eq!(playback.toggle(), ToggleOutcome::Rejected);
        assert!(!playback.is_playing());
    }

    #[test]
    fn graph_is_built_once_and_failure_is_quiet() {
        let mut playback = controller(ScriptedOutput::default());
        playback.toggle();
        playback.toggle();
        playback.toggle();
        assert_eq!(playback.output().connects, 1);
        assert!(playback.analyser().is_some());

        let mut broken = controller(ScriptedOutput {
            fail_connect: true,
            ..Default::default()
        });
        assert_eq!(broken.toggle(), ToggleOutcome::Started { fresh: true });
        assert!(broken.analyser().is_none());
    }

    #[test]
    fn resuming_mid_track_is_not_fresh() {
        let mut playback = controller(ScriptedOutput::default());
        playback.toggle();
        playback.output_mut().position = 3.5;
        playback.toggle();

        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: false });
        assert_eq!(playback.position_seconds(), 3.5);
    }

    #[test]
    fn resume_before_first_notification_is_not_fresh() {
        let config = AudioConfig {
            sample_rate: 1_000,
            position_interval_ms: 250,
            ..AudioConfig::default()
        };
        let output = BufferedOutput::new(vec![0.1; 1_000], 1_000, &config);
        let mut playback = PlaybackController::new(output, &config);
        playback.toggle();

        assert!(playback.pump(Duration::from_millis(100)).is_empty());
        assert_eq!(playback.toggle(), ToggleOutcome::Paused);
        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: false });
        assert_eq!(playback.session().position_seconds, 0.1);
    }

    #[test]
    fn long_advance_reports_every_interval() {
        let config = AudioConfig {
            sample_rate: 1_000,
            position_interval_ms: 250,
            ..AudioConfig::default()
        };
        let output = BufferedOutput::new(vec![0.1; 2_000], 1_000, &config);
        let mut playback = PlaybackController::new(output, &config);
        playback.toggle();

        assert_eq!(
            playback.pump(Duration::from_millis(1_100)),
            vec![
                AudioEvent::PositionChanged(0.25),
                AudioEvent::PositionChanged(0.5),
                AudioEvent::PositionChanged(0.75),
                AudioEvent::PositionChanged(1.0),
            ]
        );
        assert_eq!(
            playback.pump(Duration::from_millis(150)),
            vec![AudioEvent::PositionChanged(1.25)]
        );
    }

    #[test]
    fn on_ended_is_idempotent() {
        let mut playback = controller(ScriptedOutput::default());
        playback.toggle();
        playback.on_ended();
        playback.on_ended();
        playback.on_ended();

        assert!(!playback.is_playing());
        assert!(playback.has_ended());
        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: true });
        assert!(!playback.has_ended());
    }

    #[test]
    fn buffered_output_reports_positions_then_end() {
        let config = AudioConfig {
            sample_rate: 1_000,
            position_interval_ms: 250,
            ..AudioConfig::default()
        };
        let output = BufferedOutput::new(vec![0.1; 1_000], 1_000, &config);
        let mut playback = PlaybackController::new(output, &config);
        playback.toggle();

        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(playback.pump(Duration::from_millis(125)));
        }

        assert_eq!(
            events,
            vec![
                AudioEvent::PositionChanged(0.25),
                AudioEvent::PositionChanged(0.5),
                AudioEvent::PositionChanged(0.75),
                AudioEvent::PositionChanged(1.0),
                AudioEvent::Ended,
            ]
        );
        assert!(playback.has_ended());
        assert!(playback.pump(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn autoplay_policy_rejects_until_gesture() {
        let config = AudioConfig::default();
        let output = BufferedOutput::synthetic(Duration::from_secs(1), &config)
            .with_autoplay_policy(true);
        let mut playback = PlaybackController::new(output, &config);

        assert_eq!(playback.toggle(), ToggleOutcome::Rejected);
        playback.output_mut().grant_user_gesture();
        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: true });
    }

    #[test]
    fn teardown_closes_output() {
        let config = AudioConfig::default();
        let output = BufferedOutput::synthetic(Duration::from_secs(1), &config);
        let mut playback = PlaybackController::new(output, &config);
        playback.toggle();
        playback.teardown();

        assert!(playback.output().is_closed());
        assert!(playback.analyser().is_none());
        assert_eq!(playback.toggle(), ToggleOutcome::Rejected);
    }

    #[test]
    fn reopened_output_plays_from_the_start() {
        let config = AudioConfig::default();
        let output = BufferedOutput::synthetic(Duration::from_secs(2), &config);
        let mut playback = PlaybackController::new(output, &config);
        playback.toggle();
        playback.pump(Duration::from_millis(500));
        playback.teardown();

        playback.reopen().unwrap();
        assert!(!playback.output().is_closed());
        assert_eq!(playback.position_seconds(), 0.0);
        assert_eq!(playback.toggle(), ToggleOutcome::Started { fresh: true });
        assert!(playback.analyser().is_some());
    }
}
