//! Reveal scheduling: turning playback position or elapsed time into the
//! index of the last visible content segment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{config::RevealPolicyKind, CeremonyError, RevealConfig, Result};

/// One row of the position-indexed timing table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub segment_order: usize,
    pub activation_offset_seconds: f32,
}

impl TimingEntry {
    pub fn new(segment_order: usize, activation_offset_seconds: f32) -> Self {
        Self {
            segment_order,
            activation_offset_seconds,
        }
    }
}

/// Index of the last visible segment. `None` is the initial "nothing shown"
/// position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibleCursor(Option<usize>);

impl VisibleCursor {
    pub const HIDDEN: Self = Self(None);

    pub fn at(index: usize) -> Self {
        Self(Some(index))
    }

    pub fn index(self) -> Option<usize> {
        self.0
    }

    /// Signed form where `-1` means nothing is visible.
    pub fn as_signed(self) -> i64 {
        self.0.map(|index| index as i64).unwrap_or(-1)
    }

    pub fn reveals(self, order: usize) -> bool {
        self.0.is_some_and(|index| order <= index)
    }
}

/// Tracks playback position directly: the cursor follows the greatest
/// timing entry whose offset has been reached, in either direction.
#[derive(Debug, Clone)]
pub struct PositionIndexedReveal {
    timings: Vec<TimingEntry>,
    segment_count: usize,
    cursor: VisibleCursor,
    frozen: bool,
}

impl PositionIndexedReveal {
    pub fn new(timings: Vec<TimingEntry>) -> Result<Self> {
        validate_timings(&timings)?;
        Ok(Self {
            timings,
            segment_count: 0,
            cursor: VisibleCursor::HIDDEN,
            frozen: false,
        })
    }

    /// Pure table lookup, ignoring content length and freeze state.
    pub fn lookup(&self, position_seconds: f32) -> Option<usize> {
        let reached = self
            .timings
            .partition_point(|entry| entry.activation_offset_seconds <= position_seconds);
        reached
            .checked_sub(1)
            .map(|index| self.timings[index].segment_order)
    }

    pub fn on_position(&mut self, position_seconds: f32) -> VisibleCursor {
        if self.frozen || !position_seconds.is_finite() {
            return self.cursor;
        }

        match self.lookup(position_seconds) {
            Some(order) if order >= self.segment_count => {
                tracing::debug!(order, count = self.segment_count, "timing entry out of range");
            }
            Some(order) => self.cursor = VisibleCursor::at(order),
            None => self.cursor = VisibleCursor::HIDDEN,
        }
        self.cursor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerPhase {
    Idle,
    Delaying { remaining: Duration },
    Repeating { until_next: Duration },
    /// Reached the last segment or frozen at session end.
    Stopped,
}

/// Reveals the first segment after a fixed delay, then one more per
/// interval until the list is exhausted. Never moves backwards.
#[derive(Debug, Clone)]
pub struct IntervalTimerReveal {
    initial_delay: Duration,
    interval: Duration,
    segment_count: usize,
    cursor: VisibleCursor,
    phase: TimerPhase,
}

impl IntervalTimerReveal {
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
            segment_count: 0,
            cursor: VisibleCursor::HIDDEN,
            phase: TimerPhase::Idle,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self.phase,
            TimerPhase::Delaying { .. } | TimerPhase::Repeating { .. }
        )
    }

    fn start(&mut self) {
        if self.phase == TimerPhase::Idle {
            self.phase = TimerPhase::Delaying {
                remaining: self.initial_delay,
            };
        }
    }

    fn tick(&mut self, elapsed: Duration) -> VisibleCursor {
        let mut budget = elapsed;
        loop {
            match self.phase {
                TimerPhase::Delaying { remaining } => {
                    if budget < remaining {
                        self.phase = TimerPhase::Delaying {
                            remaining: remaining - budget,
                        };
                        break;
                    }
                    budget -= remaining;
                    self.step(VisibleCursor::at(0));
                }
                TimerPhase::Repeating { until_next } => {
                    if budget < until_next {
                        self.phase = TimerPhase::Repeating {
                            until_next: until_next - budget,
                        };
                        break;
                    }
                    budget -= until_next;
                    let next = self.cursor.index().map_or(0, |index| index + 1);
                    self.step(VisibleCursor::at(next));
                }
                TimerPhase::Idle | TimerPhase::Stopped => break,
            }
        }
        self.cursor
    }

    fn step(&mut self, next: VisibleCursor) {
        let Some(index) = next.index() else {
            return;
        };
        if index >= self.segment_count {
            self.phase = TimerPhase::Stopped;
            return;
        }

        self.cursor = next;
        self.phase = if index + 1 >= self.segment_count {
            TimerPhase::Stopped
        } else {
            TimerPhase::Repeating {
                until_next: self.interval,
            }
        };
    }
}

/// Reveal policy selected at configuration time.
#[derive(Debug, Clone)]
pub enum RevealScheduler {
    PositionIndexed(PositionIndexedReveal),
    IntervalTimer(IntervalTimerReveal),
}

impl RevealScheduler {
    pub fn from_config(config: &RevealConfig) -> Result<Self> {
        Ok(match config.policy {
            RevealPolicyKind::PositionIndexed => {
                Self::PositionIndexed(PositionIndexedReveal::new(config.timings.clone())?)
            }
            RevealPolicyKind::IntervalTimer => Self::IntervalTimer(IntervalTimerReveal::new(
                config.initial_delay(),
                config.interval(),
            )),
        })
    }

    pub fn kind(&self) -> RevealPolicyKind {
        match self {
            Self::PositionIndexed(_) => RevealPolicyKind::PositionIndexed,
            Self::IntervalTimer(_) => RevealPolicyKind::IntervalTimer,
        }
    }

    pub fn cursor(&self) -> VisibleCursor {
        match self {
            Self::PositionIndexed(policy) => policy.cursor,
            Self::IntervalTimer(policy) => policy.cursor,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor().index()
    }

    /// Number of segments the cursor may index into. Zero keeps the cursor
    /// hidden.
    pub fn bind_content(&mut self, segment_count: usize) {
        match self {
            Self::PositionIndexed(policy) => policy.segment_count = segment_count,
            Self::IntervalTimer(policy) => policy.segment_count = segment_count,
        }
    }

    /// Session start. Arms the interval timer; position tracking needs no
    /// arming beyond lifting a previous freeze.
    pub fn start(&mut self) {
        match self {
            Self::PositionIndexed(policy) => policy.frozen = false,
            Self::IntervalTimer(policy) => policy.start(),
        }
    }

    /// Freezes the cursor at its current value.
    pub fn stop(&mut self) {
        match self {
            Self::PositionIndexed(policy) => policy.frozen = true,
            Self::IntervalTimer(policy) => policy.phase = TimerPhase::Stopped,
        }
    }

    /// Cancels pending timers and hides everything again.
    pub fn reset(&mut self) {
        match self {
            Self::PositionIndexed(policy) => {
                policy.cursor = VisibleCursor::HIDDEN;
                policy.frozen = false;
            }
            Self::IntervalTimer(policy) => {
                policy.cursor = VisibleCursor::HIDDEN;
                policy.phase = TimerPhase::Idle;
            }
        }
    }

    /// Position-change notification. Ignored by the interval policy.
    pub fn on_position(&mut self, position_seconds: f32) -> VisibleCursor {
        match self {
            Self::PositionIndexed(policy) => policy.on_position(position_seconds),
            Self::IntervalTimer(policy) => policy.cursor,
        }
    }

    /// Wall-clock advance. Ignored by the position policy.
    pub fn tick(&mut self, elapsed: Duration) -> VisibleCursor {
        match self {
            Self::PositionIndexed(policy) => policy.cursor,
            Self::IntervalTimer(policy) => policy.tick(elapsed),
        }
    }
}

fn validate_timings(timings: &[TimingEntry]) -> Result<()> {
    if let Some(entry) = timings
        .iter()
        .find(|entry| !entry.activation_offset_seconds.is_finite() || entry.activation_offset_seconds < 0.0)
    {
        return Err(CeremonyError::InvalidTimings(format!(
            "segment {} has offset {}",
            entry.segment_order, entry.activation_offset_seconds
        )));
    }

    if let Some(pair) = timings
        .windows(2)
        .find(|pair| pair[1].activation_offset_seconds < pair[0].activation_offset_seconds)
    {
        return Err(CeremonyError::InvalidTimings(format!(
            "offset {} follows {}",
            pair[1].activation_offset_seconds, pair[0].activation_offset_seconds
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(offsets: &[f32]) -> Vec<TimingEntry> {
        offsets
            .iter()
            .enumerate()
            .map(|(order, offset)| TimingEntry::new(order, *offset))
            .collect()
    }

    fn position_scheduler(offsets: &[f32], count: usize) -> RevealScheduler {
        let mut scheduler =
            RevealScheduler::PositionIndexed(PositionIndexedReveal::new(table(offsets)).unwrap());
        scheduler.bind_content(count);
        scheduler.start();
        scheduler
    }

    fn interval_scheduler(count: usize) -> RevealScheduler {
        let mut scheduler = RevealScheduler::IntervalTimer(IntervalTimerReveal::new(
            Duration::from_secs(2),
            Duration::from_secs(1),
        ));
        scheduler.bind_content(count);
        scheduler.start();
        scheduler
    }

    #[test]
    fn reproduces_reference_table() {
        let mut scheduler = position_scheduler(&[0.0, 6.0, 13.0, 20.0, 26.0, 33.0, 40.0], 7);
        let expected = [
            (5.0, Some(0)),
            (5.0, Some(0)),
            (11.0, Some(1)),
            (18.0, Some(2)),
            (26.0, Some(4)),
            (26.0, Some(4)),
            (47.0, Some(6)),
        ];

        for (position, index) in expected {
            assert_eq!(scheduler.on_position(position).index(), index, "at {position}");
        }
    }

    #[test]
    fn before_first_offset_stays_hidden() {
        let mut scheduler = position_scheduler(&[5.0, 11.0], 2);
        assert_eq!(scheduler.on_position(4.9).as_signed(), -1);
        assert_eq!(scheduler.on_position(5.0).index(), Some(0));
    }

    #[test]
    fn non_decreasing_positions_give_non_decreasing_cursor() {
        let mut scheduler = position_scheduler(&[5.0, 11.0, 18.0, 26.0, 33.0, 40.0, 47.0], 7);
        let mut previous = -1;
        let mut position = 0.0;
        while position < 60.0 {
            let current = scheduler.on_position(position).as_signed();
            assert!(current >= previous);
            previous = current;
            position += 0.25;
        }
        assert_eq!(previous, 6);
    }

    #[test]
    fn scrubbing_backwards_lowers_the_cursor() {
        let mut scheduler = position_scheduler(&[0.0, 6.0, 13.0], 3);
        scheduler.on_position(14.0);
        assert_eq!(scheduler.on_position(7.0).index(), Some(1));
    }

    #[test]
    fn shared_offsets_resolve_to_later_entry() {
        let mut scheduler = position_scheduler(&[0.0, 6.0, 6.0, 9.0], 4);
        assert_eq!(scheduler.on_position(6.0).index(), Some(2));
    }

    #[test]
    fn out_of_range_order_is_ignored() {
        let mut scheduler = position_scheduler(&[0.0, 6.0, 13.0], 2);
        scheduler.on_position(7.0);
        assert_eq!(scheduler.on_position(14.0).index(), Some(1));
    }

    #[test]
    fn empty_content_keeps_cursor_hidden() {
        let mut scheduler = position_scheduler(&[0.0, 6.0], 0);
        assert_eq!(scheduler.on_position(10.0), VisibleCursor::HIDDEN);

        let mut timer = interval_scheduler(0);
        assert_eq!(timer.tick(Duration::from_secs(30)), VisibleCursor::HIDDEN);
    }

    #[test]
    fn stop_freezes_and_reset_hides() {
        let mut scheduler = position_scheduler(&[0.0, 6.0, 13.0], 3);
        scheduler.on_position(7.0);
        scheduler.stop();
        assert_eq!(scheduler.on_position(0.0).index(), Some(1));

        scheduler.reset();
        assert_eq!(scheduler.current_index(), None);
        assert_eq!(scheduler.on_position(0.5).index(), Some(0));
    }

    #[test]
    fn rejects_unsorted_or_negative_tables() {
        assert!(matches!(
            PositionIndexedReveal::new(table(&[0.0, 6.0, 3.0])),
            Err(CeremonyError::InvalidTimings(_))
        ));
        assert!(PositionIndexedReveal::new(table(&[-1.0])).is_err());
        assert!(PositionIndexedReveal::new(table(&[f32::NAN])).is_err());
    }

    #[test]
    fn interval_reveals_after_initial_delay() {
        let mut scheduler = interval_scheduler(4);
        assert_eq!(scheduler.tick(Duration::from_millis(1_999)).index(), None);
        assert_eq!(scheduler.tick(Duration::from_millis(1)).index(), Some(0));
    }

    #[test]
    fn interval_counts_ticks_and_saturates() {
        let mut scheduler = interval_scheduler(4);
        scheduler.tick(Duration::from_secs(2));

        let mut previous = 0;
        for k in 1..=8 {
            let index = scheduler.tick(Duration::from_secs(1)).index().unwrap();
            assert_eq!(index, k.min(3));
            assert!(index >= previous);
            previous = index;
        }
    }

    #[test]
    fn interval_catches_up_on_long_ticks() {
        let mut scheduler = interval_scheduler(10);
        assert_eq!(scheduler.tick(Duration::from_millis(4_500)).index(), Some(2));
    }

    #[test]
    fn interval_reset_cancels_pending_timer() {
        let mut scheduler = interval_scheduler(4);
        scheduler.tick(Duration::from_secs(3));
        scheduler.reset();

        assert_eq!(scheduler.tick(Duration::from_secs(10)).index(), None);
        let RevealScheduler::IntervalTimer(policy) = &scheduler else {
            unreachable!();
        };
        assert!(!policy.is_pending());
    }

    #[test]
    fn interval_ignores_audio_position() {
        let mut scheduler = interval_scheduler(4);
        assert_eq!(scheduler.on_position(100.0).index(), None);
    }
}
