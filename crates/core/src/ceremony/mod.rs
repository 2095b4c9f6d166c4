//! Composition of signature capture, playback, visualizer and reveal.
//!
//! The orchestrator is driven from a single thread: input handlers call the
//! stroke and toggle methods, and the host calls [`CeremonyOrchestrator::tick`]
//! once per display refresh with the time that passed since the last call.
//! Every call returns the [`CeremonyEvent`]s it produced, in order.

use std::time::Duration;

use crate::{
    config::ReplayPolicy,
    gesture::{GestureCapture, GestureEvent, Point, SignatureSnapshot},
    AppConfig, AudioEvent, AudioOutput, Canvas, ContentProvider, ContentState, FrequencySampler,
    PlaybackController, Result, RevealScheduler, ToggleOutcome, VisibleCursor, VisualizerRenderer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Idle,
    Signing,
    Signed,
    Playing,
    /// Playback paused by the user mid-track.
    Paused,
    Ended,
}

/// Value handed from the signing screen to the ceremony screen. Consumed
/// once when the ceremony view becomes active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHandoff {
    pub user_interacted: bool,
    pub signature: Option<SignatureSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CeremonyEvent {
    /// First stroke on the pad; presentation may play an ambient cue.
    SigningStarted,
    /// Signature accepted. The caller navigates to the ceremony view and
    /// passes the handoff to [`CeremonyOrchestrator::enter_ceremony`].
    Signed(SessionHandoff),
    PlaybackStarted { fresh: bool },
    PlaybackPaused,
    /// The host refused to start audio; the toggle stays available.
    PlaybackRejected,
    Revealed(VisibleCursor),
    Ended,
    /// Replay after the end sent the user back to the signature pad.
    ReturnedToSigning,
}

#[derive(Debug)]
pub struct CeremonyOrchestrator<O: AudioOutput> {
    config: AppConfig,
    state: CeremonyState,
    gesture: GestureCapture,
    playback: PlaybackController<O>,
    sampler: Option<FrequencySampler>,
    visualizer: VisualizerRenderer,
    reveal: RevealScheduler,
    content: ContentState,
    signature: Option<SignatureSnapshot>,
    view_active: bool,
    auto_start: Option<Duration>,
}

impl<O: AudioOutput> CeremonyOrchestrator<O> {
    /// Fails only on a malformed reveal timing table.
    pub fn new(config: AppConfig, output: O) -> Result<Self> {
        let reveal = RevealScheduler::from_config(&config.reveal)?;
        tracing::debug!(policy = ?reveal.kind(), "reveal scheduler ready");
        Ok(Self {
            gesture: GestureCapture::new(&config.gesture),
            playback: PlaybackController::new(output, &config.audio),
            sampler: None,
            visualizer: VisualizerRenderer::new(config.visualizer.clone()),
            reveal,
            content: ContentState::Loading,
            signature: None,
            view_active: false,
            auto_start: None,
            state: CeremonyState::Idle,
            config,
        })
    }

    pub fn state(&self) -> CeremonyState {
        self.state
    }

    pub fn cursor(&self) -> VisibleCursor {
        self.reveal.cursor()
    }

    pub fn content(&self) -> &ContentState {
        &self.content
    }

    pub fn gesture(&self) -> &GestureCapture {
        &self.gesture
    }

    pub fn playback(&self) -> &PlaybackController<O> {
        &self.playback
    }

    pub fn visualizer(&self) -> &VisualizerRenderer {
        &self.visualizer
    }

    /// Snapshot of the accepted signature, kept for optional export.
    pub fn signature(&self) -> Option<&SignatureSnapshot> {
        self.signature.as_ref()
    }

    pub fn auto_start_pending(&self) -> bool {
        self.auto_start.is_some()
    }

    pub fn begin_stroke(&mut self, point: Point) -> Vec<CeremonyEvent> {
        if !matches!(self.state, CeremonyState::Idle | CeremonyState::Signing) {
            return Vec::new();
        }

        match self.gesture.begin_stroke(point) {
            Some(GestureEvent::SigningStarted) => {
                self.state = CeremonyState::Signing;
                vec![CeremonyEvent::SigningStarted]
            }
            _ => Vec::new(),
        }
    }

    pub fn extend_stroke(&mut self, point: Point) {
        self.gesture.extend_stroke(point);
    }

    pub fn end_stroke(&mut self) {
        self.gesture.end_stroke();
    }

    pub fn clear_signature(&mut self) {
        self.gesture.clear();
        if self.state == CeremonyState::Signing {
            self.state = CeremonyState::Idle;
        }
    }

    pub fn confirm_signature(&mut self) -> Vec<CeremonyEvent> {
        match self.gesture.confirm() {
            Some(GestureEvent::Completed(snapshot)) => vec![self.on_signed(snapshot)],
            _ => Vec::new(),
        }
    }

    /// Activates the ceremony view: loads content, reopens audio released by
    /// an earlier [`teardown`](Self::teardown) and, when the handoff says the
    /// user already interacted, arms the delayed auto-start.
    pub fn enter_ceremony<P>(&mut self, handoff: SessionHandoff, provider: &P)
    where
        P: ContentProvider + ?Sized,
    {
        self.view_active = true;
        if let Err(err) = self.playback.reopen() {
            tracing::warn!(%err, "audio output could not be reopened");
        }
        self.content = ContentState::load(provider, &self.config.ceremony.content_id);
        self.reveal.bind_content(self.content.segments().len());

        if handoff.signature.is_some() && self.signature.is_none() {
            self.signature = handoff.signature;
        }

        if handoff.user_interacted {
            self.playback.output_mut().grant_user_gesture();
            let delay = self.config.ceremony.auto_start_delay();
            tracing::debug!(?delay, "auto-start armed");
            self.auto_start = Some(delay);
        }
    }

    /// Manual play/pause control.
    pub fn toggle(&mut self) -> Vec<CeremonyEvent> {
        if !self.view_active {
            tracing::debug!("toggle ignored outside the ceremony view");
            return Vec::new();
        }
        self.auto_start = None;

        if self.state == CeremonyState::Ended
            && self.config.ceremony.replay == ReplayPolicy::RestartSignature
        {
            return self.return_to_signing();
        }

        self.apply_toggle()
    }

    /// Advances every timer and loop by `elapsed` and paints at most one
    /// visualizer frame onto `canvas`.
    pub fn tick<C: Canvas>(&mut self, elapsed: Duration, canvas: &mut C) -> Vec<CeremonyEvent> {
        let mut events = Vec::new();

        if let Some(GestureEvent::Completed(snapshot)) = self.gesture.tick(elapsed) {
            events.push(self.on_signed(snapshot));
        }

        if let Some(remaining) = self.auto_start {
            match remaining.checked_sub(elapsed) {
                Some(left) if !left.is_zero() => self.auto_start = Some(left),
                _ => events.extend(self.run_auto_start()),
            }
        }

        for event in self.playback.pump(elapsed) {
            match event {
                AudioEvent::PositionChanged(position) => {
                    let before = self.reveal.cursor();
                    let after = self.reveal.on_position(position);
                    if after != before {
                        tracing::info!(index = after.as_signed(), position, "reveal advanced");
                        events.push(CeremonyEvent::Revealed(after));
                    }
                }
                AudioEvent::Ended => events.extend(self.on_playback_ended()),
            }
        }

        let before = self.reveal.cursor();
        let after = self.reveal.tick(elapsed);
        if after != before {
            tracing::info!(index = after.as_signed(), "reveal advanced");
            events.push(CeremonyEvent::Revealed(after));
        }

        if let Some(sampler) = self.sampler.as_mut() {
            if let Err(err) = self.visualizer.on_refresh(elapsed, sampler, canvas) {
                tracing::warn!(%err, "visualizer frame failed, stopping loop");
                self.visualizer.stop();
            }
        }

        events
    }

    /// Cancels every loop and timer, then releases the audio output. The
    /// state falls back to `Signed` (or `Idle` without a signature) so the
    /// ceremony can be entered again.
    pub fn teardown(&mut self) {
        self.auto_start = None;
        self.visualizer.stop();
        self.reveal.reset();
        self.sampler = None;
        self.playback.teardown();
        self.view_active = false;
        if matches!(
            self.state,
            CeremonyState::Playing | CeremonyState::Paused | CeremonyState::Ended
        ) {
            self.state = if self.signature.is_some() {
                CeremonyState::Signed
            } else {
                CeremonyState::Idle
            };
        }
        tracing::info!(state = ?self.state, "ceremony torn down");
    }

    fn on_signed(&mut self, snapshot: SignatureSnapshot) -> CeremonyEvent {
        self.state = CeremonyState::Signed;
        self.signature = Some(snapshot.clone());
        self.playback.output_mut().grant_user_gesture();
        CeremonyEvent::Signed(SessionHandoff {
            user_interacted: true,
            signature: Some(snapshot),
        })
    }

    fn run_auto_start(&mut self) -> Vec<CeremonyEvent> {
        self.auto_start = None;
        let events = self.apply_toggle();
        if events.contains(&CeremonyEvent::PlaybackRejected) {
            tracing::info!("auto-start refused by host, waiting for manual toggle");
        }
        events
    }

    fn apply_toggle(&mut self) -> Vec<CeremonyEvent> {
        let mut events = Vec::new();
        match self.playback.toggle() {
            ToggleOutcome::Started { fresh } => {
                if fresh {
                    let before = self.reveal.cursor();
                    self.reveal.reset();
                    if before != VisibleCursor::HIDDEN {
                        events.push(CeremonyEvent::Revealed(VisibleCursor::HIDDEN));
                    }
                }
                self.reveal.start();
                self.start_visualizer();
                self.state = CeremonyState::Playing;
                events.insert(0, CeremonyEvent::PlaybackStarted { fresh });
            }
            ToggleOutcome::Paused => {
                self.visualizer.stop();
                self.state = CeremonyState::Paused;
                events.push(CeremonyEvent::PlaybackPaused);
            }
            ToggleOutcome::Rejected => {
                self.visualizer.stop();
                events.push(CeremonyEvent::PlaybackRejected);
            }
        }
        events
    }

    fn start_visualizer(&mut self) {
        if self.sampler.is_none() {
            let Some(analyser) = self.playback.analyser() else {
                return;
            };
            match FrequencySampler::new(analyser, &self.config.audio) {
                Ok(sampler) => self.sampler = Some(sampler),
                Err(err) => {
                    tracing::warn!(%err, "frequency sampler unavailable");
                    return;
                }
            }
        }
        self.visualizer.start();
    }

    fn on_playback_ended(&mut self) -> Vec<CeremonyEvent> {
        self.playback.on_ended();
        self.visualizer.stop();
        if self.state != CeremonyState::Playing {
            return Vec::new();
        }

        self.reveal.stop();
        self.state = CeremonyState::Ended;
        tracing::info!(index = self.reveal.cursor().as_signed(), "recitation ended");
        vec![CeremonyEvent::Ended]
    }

    fn return_to_signing(&mut self) -> Vec<CeremonyEvent> {
        self.visualizer.stop();
        self.reveal.reset();
        self.gesture.clear();
        self.signature = None;
        self.view_active = false;
        self.state = CeremonyState::Idle;
        tracing::info!("replay requested, returning to signature pad");
        vec![CeremonyEvent::ReturnedToSigning]
    }
}
