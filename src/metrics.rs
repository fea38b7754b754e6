//! Plain counters, not a metrics crate — SPEC_FULL §3 calls for "struct
//! fields", since the teacher's `dipstick` bucket reports on entities and
//! audio-gather timings this runtime has no equivalent of.

use log::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct Metrics {
    pub frame_ticks: u64,
    pub midi_ticks: u64,
    pub ops_executed: u64,
    pub sequencers_spawned: u64,
    pub active_sequencers: u32,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_tick(&mut self) {
        self.frame_ticks += 1;
    }

    pub fn record_midi_ticks(&mut self, n: u32) {
        self.midi_ticks += n as u64;
    }

    pub fn record_ops(&mut self, n: u64) {
        self.ops_executed += n;
    }

    pub fn record_spawn(&mut self) {
        self.sequencers_spawned += 1;
    }

    pub fn set_active_sequencers(&mut self, n: u32) {
        self.active_sequencers = n;
    }

    pub fn report(&self) {
        info!(
            "frame_ticks={} midi_ticks={} ops_executed={} sequencers_spawned={} active={}",
            self.frame_ticks,
            self.midi_ticks,
            self.ops_executed,
            self.sequencers_spawned,
            self.active_sequencers
        );
    }
}
