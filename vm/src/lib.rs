//! The execution engine: sequencers, the frame-stack interpreter, the
//! two-clock scheduler, and the event registry (spec §4.2-§4.5, §4.8).

mod interpreter;
pub mod intrinsics;
pub mod ops;
pub mod registry;
pub mod sequencer;
mod vm;

pub use intrinsics::{IntrinsicHost, NullIntrinsicHost};
pub use registry::{EventRegistry, HandlerTemplate};
pub use sequencer::{Frame, Resume, Sequencer, SequencerId};
pub use vm::{Vm, LOOP_SAFETY_CAP, OP_CAP};
