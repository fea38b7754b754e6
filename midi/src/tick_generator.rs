//! Converts rendered audio samples into monotonic integer MIDI ticks under a
//! non-uniform tempo map, without drift (spec §4.6).

use anyhow::{ensure, Result};
use more_asserts::assert_le;

use crate::tempo::TempoMap;

/// State: a fractional tick cursor, the sample-rate-derived conversion
/// factor, and the current tempo-map segment index.
#[derive(Debug)]
pub struct TickGenerator {
    sample_rate: u32,
    ppq: u32,
    tempo_map: TempoMap,
    fractional_tick: f64,
    last_delivered_tick: i64,
    tempo_index: usize,
}

impl TickGenerator {
    /// Rejects `sample_rate` outside `[8000, 192000]` and `ppq <= 0` at
    /// construction (spec §4.6 "Validation").
    pub fn new(sample_rate: u32, ppq: u32, tempo_map: TempoMap) -> Result<Self> {
        ensure!(
            (8_000..=192_000).contains(&sample_rate),
            "sample rate {sample_rate} out of range [8000, 192000]"
        );
        ensure!(ppq > 0, "ppq must be positive, got {ppq}");
        Ok(Self {
            sample_rate,
            ppq,
            tempo_map,
            fractional_tick: 0.0,
            last_delivered_tick: -1,
            tempo_index: 0,
        })
    }

    pub fn reset(&mut self) {
        self.fractional_tick = 0.0;
        self.last_delivered_tick = -1;
        self.tempo_index = 0;
    }

    pub fn last_delivered_tick(&self) -> i64 {
        self.last_delivered_tick
    }

    fn bpm_for_current_segment(&self) -> f64 {
        60_000_000.0 / self.tempo_map.events()[self.tempo_index].micros_per_beat as f64
    }

    fn advance_tempo_segment_if_crossed(&mut self) {
        while let Some(next_tick) = self.tempo_map.next_segment_tick(self.tempo_index) {
            if self.fractional_tick.floor() as i64 >= next_tick as i64 {
                self.tempo_index += 1;
            } else {
                break;
            }
        }
    }

    /// Advances the cursor by `n` samples and reports the new integer tick if
    /// one was crossed, else `None`. Strictly monotonic non-decreasing
    /// (spec §8 P2).
    pub fn process_samples(&mut self, n: u32) -> Option<i64> {
        if n == 0 {
            return None;
        }
        let dt = n as f64 / self.sample_rate as f64;
        let bpm = self.bpm_for_current_segment();
        let tick_delta = dt * (bpm / 60.0) * self.ppq as f64;
        self.fractional_tick += tick_delta;
        self.advance_tempo_segment_if_crossed();

        let floor_tick = self.fractional_tick.floor() as i64;
        assert_le!(self.last_delivered_tick, floor_tick);
        if floor_tick > self.last_delivered_tick {
            self.last_delivered_tick = floor_tick;
            Some(floor_tick)
        } else {
            None
        }
    }

    /// The tick delta to report to `Engine::tick_midi`, given the previous
    /// call's return value, coalescing any `n == 0` case to nothing (spec
    /// §5: "ties within one audio buffer are coalesced into a single call
    /// with n >= 1").
    pub fn tick_delta_since(new_tick: i64, previous_tick: i64) -> u32 {
        (new_tick - previous_tick).max(0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::TempoEvent;

    #[test]
    fn rejects_bad_sample_rate_and_ppq() {
        assert!(TickGenerator::new(7_999, 480, TempoMap::default_map()).is_err());
        assert!(TickGenerator::new(192_001, 480, TempoMap::default_map()).is_err());
        assert!(TickGenerator::new(44_100, 0, TempoMap::default_map()).is_err());
    }

    #[test]
    fn half_second_at_120bpm_480ppq_yields_480_ticks() {
        // 120 BPM, PPQ 480 => 480 ticks per beat per 0.5s (one beat per 0.5s).
        let mut gen = TickGenerator::new(44_100, 480, TempoMap::default_map()).unwrap();
        let samples = (44_100.0 * 0.5) as u32;
        let mut last = None;
        let mut remaining = samples;
        while remaining > 0 {
            let chunk = remaining.min(1_024);
            if let Some(t) = gen.process_samples(chunk) {
                last = Some(t);
            }
            remaining -= chunk;
        }
        assert_eq!(last, Some(480));
    }

    #[test]
    fn tempo_change_mid_stream_tracks_new_bpm() {
        // 120 -> 140 BPM at tick 480, matching spec §8 scenario 5.
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
        let mut gen = TickGenerator::new(44_100, 480, map).unwrap();
        let half_second = (44_100.0 * 0.5) as u32;

        let mut tick_at_half = 0i64;
        let mut remaining = half_second;
        while remaining > 0 {
            let chunk = remaining.min(512);
            if let Some(t) = gen.process_samples(chunk) {
                tick_at_half = t;
            }
            remaining -= chunk;
        }
        assert_eq!(tick_at_half, 480);

        let mut tick_at_one = tick_at_half;
        let mut remaining = half_second;
        while remaining > 0 {
            let chunk = remaining.min(512);
            if let Some(t) = gen.process_samples(chunk) {
                tick_at_one = t;
            }
            remaining -= chunk;
        }
        // 480 + round(0.5 * (140/60) * 480) = 480 + 560, +-1 for drift.
        assert!((tick_at_one - 1_040).abs() <= 1, "got {tick_at_one}");
    }

    #[test]
    fn monotonic_across_many_small_calls() {
        let mut gen = TickGenerator::new(44_100, 480, TempoMap::default_map()).unwrap();
        let mut last = -1i64;
        for _ in 0..10_000 {
            if let Some(t) = gen.process_samples(17) {
                assert!(t > last);
                last = t;
            }
        }
    }

    #[test]
    fn reset_clears_all_state() {
        let mut gen = TickGenerator::new(44_100, 480, TempoMap::default_map()).unwrap();
        gen.process_samples(44_100);
        assert!(gen.last_delivered_tick() > 0);
        gen.reset();
        assert_eq!(gen.last_delivered_tick(), -1);
    }
}
