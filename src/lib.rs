//! The `filly` runtime: the `Engine` facade over `filly-vm`'s cooperative
//! scheduler, a headless `NullRenderer`, a handle-keyed WAV/resource cache,
//! and hand-rolled INI/binary persistence (spec §3, §6).

pub mod engine;
pub mod intrinsics;
pub mod metrics;
pub mod persistence;
pub mod renderer;
pub mod resources;
pub mod synth;

pub use engine::Engine;
pub use renderer::NullRenderer;
pub use synth::NullSynth;

pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
