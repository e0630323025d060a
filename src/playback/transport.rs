//! Transport clock shared by every voice of a song.
//!
//! Events are scheduled at absolute positions (seconds from the start of the
//! song). The clock itself is driven by the caller passing `now`, which keeps
//! the transport free of timers and trivially testable.

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Started,
    Paused,
}

#[derive(Debug, Clone)]
struct ScheduledEvent<E> {
    time: f64,
    event: E,
}

#[derive(Debug)]
pub struct Transport<E> {
    state: TransportState,
    /// Position at `anchor`, or the frozen position while not started.
    offset: f64,
    anchor: Option<Instant>,
    /// Position up to which events have already been handed out.
    cursor: f64,
    /// Sorted by time; events at equal times keep insertion order.
    schedule: Vec<ScheduledEvent<E>>,
}

impl<E: Clone> Default for Transport<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Transport<E> {
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped,
            offset: 0.0,
            anchor: None,
            cursor: 0.0,
            schedule: Vec::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Schedule `event` at `time` seconds.
    pub fn schedule(&mut self, time: f64, event: E) {
        let time = time.max(0.0);
        let idx = self.schedule.partition_point(|e| e.time <= time);
        self.schedule.insert(idx, ScheduledEvent { time, event });
    }

    pub fn scheduled_len(&self) -> usize {
        self.schedule.len()
    }

    /// Drop every scheduled event.
    pub fn cancel(&mut self) {
        self.schedule.clear();
    }

    pub fn start(&mut self, now: Instant) {
        if self.state == TransportState::Started {
            return;
        }
        self.anchor = Some(now);
        self.state = TransportState::Started;
    }

    pub fn pause(&mut self, now: Instant) {
        if self.state != TransportState::Started {
            return;
        }
        self.offset = self.position(now);
        self.anchor = None;
        self.state = TransportState::Paused;
    }

    /// Stop and rewind to zero. The schedule is kept.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.offset = 0.0;
        self.cursor = 0.0;
        self.anchor = None;
    }

    pub fn position(&self, now: Instant) -> f64 {
        match self.anchor {
            Some(anchor) => self.offset + now.saturating_duration_since(anchor).as_secs_f64(),
            None => self.offset,
        }
    }

    /// Jump to `seconds`. Events before the new position will not be handed out.
    pub fn seek(&mut self, now: Instant, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.offset = seconds;
        self.cursor = seconds;
        if self.state == TransportState::Started {
            self.anchor = Some(now);
        }
    }

    /// Events whose time lies between the previous call and the current position.
    pub fn due(&mut self, now: Instant) -> Vec<(f64, E)> {
        if self.state != TransportState::Started {
            return Vec::new();
        }
        let position = self.position(now);
        if position <= self.cursor {
            return Vec::new();
        }

        let start = self.schedule.partition_point(|e| e.time < self.cursor);
        let end = self.schedule.partition_point(|e| e.time < position);
        self.cursor = position;

        self.schedule[start..end]
            .iter()
            .map(|e| (e.time, e.event.clone()))
            .collect()
    }
}
