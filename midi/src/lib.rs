//! SMF parsing, tempo mapping, and MIDI-tick generation for the FILLY
//! runtime's `MIDI_TIME` clock (spec §3, §4.6, §4.7).

pub mod player;
pub mod smf;
pub mod tempo;
pub mod tick_generator;

pub use player::{MidiPlayer, PumpResult};
pub use smf::{parse as parse_smf, ParsedSmf, ScheduledEvent};
pub use tempo::{TempoEvent, TempoMap};
pub use tick_generator::TickGenerator;
