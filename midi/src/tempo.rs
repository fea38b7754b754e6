//! The piecewise-constant tempo map (spec §3 "Tempo Map").

use more_asserts::debug_assert_gt;

/// One tempo-map entry: the MIDI tick at which a new microseconds-per-beat
/// value takes effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempoEvent {
    pub tick: u32,
    pub micros_per_beat: u32,
}

/// An ordered, strictly-increasing-in-tick sequence of [`TempoEvent`]s, with
/// a synthetic head entry of 120 BPM at tick 0 if the source never supplies
/// one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TempoMap {
    events: Vec<TempoEvent>,
}

impl TempoMap {
    pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000; // 120 BPM

    /// Builds a tempo map from `(tick, micros_per_beat)` pairs in the order
    /// they were encountered while walking a file's meta events. Out-of-order
    /// or duplicate-tick entries are dropped (last-wins at a given tick is
    /// resolved by insertion order from the caller, which already walks
    /// tracks in tick order).
    pub fn new(mut events: Vec<TempoEvent>) -> Self {
        events.sort_by_key(|e| e.tick);
        events.dedup_by_key(|e| e.tick);
        if events.first().map(|e| e.tick) != Some(0) {
            events.insert(
                0,
                TempoEvent {
                    tick: 0,
                    micros_per_beat: Self::DEFAULT_MICROS_PER_BEAT,
                },
            );
        }
        for w in events.windows(2) {
            debug_assert_gt!(w[1].tick, w[0].tick);
        }
        Self { events }
    }

    pub fn default_map() -> Self {
        Self::new(vec![])
    }

    pub fn events(&self) -> &[TempoEvent] {
        &self.events
    }

    /// The tempo-map index whose segment contains `tick` (i.e. the last
    /// entry whose `tick <= tick`).
    pub fn segment_index_for_tick(&self, tick: u32) -> usize {
        match self.events.binary_search_by_key(&tick, |e| e.tick) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    pub fn micros_per_beat_at(&self, tick: u32) -> u32 {
        self.events[self.segment_index_for_tick(tick)].micros_per_beat
    }

    pub fn bpm_at(&self, tick: u32) -> f64 {
        60_000_000.0 / self.micros_per_beat_at(tick) as f64
    }

    /// The tick at which the segment `index + 1` begins, or `None` if
    /// `index` is the last segment.
    pub fn next_segment_tick(&self, index: usize) -> Option<u32> {
        self.events.get(index + 1).map(|e| e.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_default_head_entry() {
        let map = TempoMap::new(vec![TempoEvent {
            tick: 480,
            micros_per_beat: 400_000,
        }]);
        assert_eq!(map.events()[0].tick, 0);
        assert_eq!(
            map.events()[0].micros_per_beat,
            TempoMap::DEFAULT_MICROS_PER_BEAT
        );
    }

    #[test]
    fn segment_lookup_is_piecewise_constant() {
        let map = TempoMap::new(vec![
            TempoEvent {
                tick: 0,
                micros_per_beat: 500_000,
            },
            TempoEvent {
                tick: 480,
                micros_per_beat: 428_571,
            },
        ]);
        assert_eq!(map.micros_per_beat_at(0), 500_000);
        assert_eq!(map.micros_per_beat_at(479), 500_000);
        assert_eq!(map.micros_per_beat_at(480), 428_571);
        assert_eq!(map.micros_per_beat_at(1_000_000), 428_571);
    }
}
