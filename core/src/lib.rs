//! Fundamental types shared across the FILLY runtime: the bytecode IR, the
//! dynamic [`Value`], case-insensitive variable storage, the two clock
//! [`Mode`]s, event types, small graphics vocabulary, and the external
//! collaborator traits named by spec §6 (`Renderer`, `AudioSink`, `Synth`,
//! `AssetLoader`).

pub mod event;
pub mod graphics;
pub mod mode;
pub mod opcode;
pub mod scope;
pub mod traits;
pub mod value;

pub use event::{EventType, MesParams};
pub use mode::Mode;
pub use opcode::{validate_program, Arg, OpTag, Opcode, RawArg, RawHandler, RawOp, RawProgram};
pub use scope::VarTable;
pub use value::Value;
