//! The two clock domains a [`Sequencer`](../../filly_vm/struct.Sequencer.html)
//! can run under (spec §2, §4.3.1).

use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Mode {
    #[strum(serialize = "TIME")]
    Time,
    #[strum(serialize = "MIDI_TIME")]
    MidiTime,
}

impl Mode {
    /// Default `ticks_per_step` on sequencer creation (spec §4.3.1).
    pub fn default_ticks_per_step(self) -> u32 {
        match self {
            Mode::Time => 3,
            Mode::MidiTime => 1,
        }
    }

    /// `set-step(n)`'s effect on `ticks_per_step` (spec §4.3.1). `ppq` is
    /// ignored in TIME mode.
    pub fn ticks_per_step_for_set_step(self, n: u32, ppq: u32) -> u32 {
        let raw = match self {
            Mode::Time => n.saturating_mul(3),
            Mode::MidiTime => (ppq / 8).saturating_mul(n),
        };
        raw.max(1)
    }
}
