//! Apple II speaker model: a 1-bit DAC toggled by every $C030 access.
//!
//! The core emits level-change timestamps rather than PCM samples — the
//! host resamples to its own output rate. This keeps the core's audio
//! output deterministic given the same cycle trace, independent of
//! whatever sample rate a particular frontend plays at.

use std::collections::VecDeque;

/// Worst-case toggles in a single frame's worth of audio (per spec's
/// "buffer is sized for at least one frame's worth of worst-case toggles").
const MAX_QUEUED_EVENTS: usize = 30_000;

/// Speaker toggle events, timestamped in CPU cycles since power-on.
pub struct Speaker {
    events: VecDeque<u64>,
}

impl Speaker {
    pub fn new() -> Self {
        Speaker {
            events: VecDeque::with_capacity(1024),
        }
    }

    /// Records a toggle at `cycle`. Called on every $C030 access.
    pub fn click(&mut self, cycle: u64) {
        self.events.push_back(cycle);
        if self.events.len() > MAX_QUEUED_EVENTS {
            self.events.pop_front();
        }
    }

    /// Drains all queued toggle timestamps for the host to resample.
    pub fn drain_events(&mut self) -> Vec<u64> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for Speaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_events_in_order_and_empties_queue() {
        let mut speaker = Speaker::new();
        speaker.click(100);
        speaker.click(250);
        speaker.click(900);
        let drained = speaker.drain_events();
        assert_eq!(drained, vec![100, 250, 900]);
        assert_eq!(speaker.pending_count(), 0);
    }

    #[test]
    fn queue_drops_oldest_past_capacity() {
        let mut speaker = Speaker::new();
        for cycle in 0..MAX_QUEUED_EVENTS as u64 + 10 {
            speaker.click(cycle);
        }
        assert_eq!(speaker.pending_count(), MAX_QUEUED_EVENTS);
        let drained = speaker.drain_events();
        assert_eq!(drained[0], 10);
    }
}
