//! Event types recognized by the Event Registry (spec §4.5).

use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum EventType {
    #[strum(serialize = "TIME")]
    Time,
    #[strum(serialize = "MIDI_TIME")]
    MidiTime,
    #[strum(serialize = "MIDI_END")]
    MidiEnd,
    #[strum(serialize = "KEY")]
    Key,
    #[strum(serialize = "CLICK")]
    Click,
    #[strum(serialize = "RBDOWN")]
    RbDown,
    #[strum(serialize = "RBDBLCLK")]
    RbDblClk,
    #[strum(serialize = "USER")]
    User,
}

impl EventType {
    /// These two event types "run continuously": registering a template for
    /// them also instantiates and enqueues one live Sequencer immediately
    /// (spec §4.5).
    pub fn runs_continuously(self) -> bool {
        matches!(self, EventType::Time | EventType::MidiTime)
    }
}

/// The up-to-four trigger parameters seeded as `MesP1..MesP4` on a freshly
/// instantiated Sequencer (spec §4.5).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MesParams(pub i64, pub i64, pub i64, pub i64);

impl MesParams {
    pub const ZERO: MesParams = MesParams(0, 0, 0, 0);

    pub fn var_names() -> [&'static str; 4] {
        ["MesP1", "MesP2", "MesP3", "MesP4"]
    }

    pub fn values(self) -> [i64; 4] {
        [self.0, self.1, self.2, self.3]
    }
}
