//! The remaining half of `call`'s dispatch table (spec §4.9), once the
//! interpreter has peeled off what it handles directly: sequence-lifecycle
//! intrinsics (`del_me`, `del_us`, `del_all`, `exit_title`, `post_mes`)
//! mutate scheduler/registry state, and array intrinsics (`size`, `clear`,
//! `delete-at`, `insert-at`) need the calling sequencer's own variable scope
//! by name rather than an evaluated value — both need `&mut Vm`, not a
//! `Value` slice. Everything left — graphics, text, audio, filesystem,
//! bitops, time, PRNG — is dispatched through this trait, implemented by the
//! root crate's `Engine`.

use anyhow::Result;
use filly_core::Value;

/// Implemented by whatever owns pictures/windows/casts/the asset loader/the
/// MIDI player. An unknown name is a fatal runtime error (spec §4.9, §7
/// "Missing intrinsic").
pub trait IntrinsicHost {
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Value>;
}

/// A host that recognizes nothing; useful for unit tests of the interpreter
/// that only exercise lifecycle intrinsics and core expression evaluation.
#[derive(Default)]
pub struct NullIntrinsicHost;

impl IntrinsicHost for NullIntrinsicHost {
    fn call(&mut self, name: &str, _args: &[Value]) -> Result<Value> {
        anyhow::bail!("unknown intrinsic `{name}`")
    }
}
