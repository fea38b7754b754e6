//! Audio sinks implementing `filly_core::traits::AudioSink` (spec §6).
//!
//! `NullAudioSink` is always available and is what headless runs and tests
//! use. The `cpal-sink` feature adds `CpalAudioSink`, a real output device
//! backed by `cpal`, modeled on the producer/consumer queue the engine's
//! audio stream used internally, adapted to the push-based sink contract.

mod null;

#[cfg(feature = "cpal-sink")]
mod cpal_sink;

pub use null::NullAudioSink;

#[cfg(feature = "cpal-sink")]
pub use cpal_sink::CpalAudioSink;
