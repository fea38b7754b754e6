//! The bytecode IR (spec §4.1) and its load-time validation pass.
//!
//! The upstream compiler hands the runtime an in-memory opcode tree. We model
//! what arrives from that boundary as [`RawOp`] — a loosely-typed tag plus an
//! argument list, exactly the shape a deserializer for "some other process's
//! bytecode format" produces. [`validate_program`] is the one-way door from
//! that untrusted shape into [`Opcode`], whose `tag` field is a closed `enum`
//! the interpreter can match exhaustively. Nothing downstream of validation
//! ever sees an unrecognized tag again.

use anyhow::{bail, Context, Result};
use strum_macros::{Display, EnumIter, EnumString};

use crate::value::Value;

/// The closed set of opcode tags from spec §4.1. Anything not in this set is
/// a fatal load-time error, never a runtime condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OpTag {
    Literal,
    VarRef,
    Assign,
    AssignArray,
    Index,
    Infix,
    Prefix,
    Call,
    RegisterSequence,
    Wait,
    SetStep,
    Step,
    If,
    For,
    While,
    DoWhile,
    Switch,
    Break,
    Continue,
}

/// The wire shape produced upstream: a tag name the compiler emitted, plus a
/// raw argument list. Never executed directly.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RawOp {
    pub tag: String,
    pub args: Vec<RawArg>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum RawArg {
    Lit(Value),
    Var(String),
    Op(RawOp),
    Body(Vec<RawOp>),
}

/// A single validated opcode: a closed tag plus its (also validated)
/// arguments. Immutable after load, and cheap to clone since `commands` lists
/// are shared by reference wherever possible (see `filly_vm::Sequencer`).
#[derive(Clone, Debug, PartialEq)]
pub struct Opcode {
    pub tag: OpTag,
    pub args: Vec<Arg>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Lit(Value),
    Var(String),
    Op(Box<Opcode>),
    Body(Vec<Opcode>),
}

impl Arg {
    pub fn as_lit(&self) -> Option<&Value> {
        match self {
            Arg::Lit(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Arg::Var(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn as_op(&self) -> Option<&Opcode> {
        match self {
            Arg::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_body(&self) -> Option<&[Opcode]> {
        match self {
            Arg::Body(body) => Some(body),
            _ => None,
        }
    }
}

/// Recursively validates a raw opcode tree, rejecting any tag outside the
/// closed set. Called once at load time; never again at runtime (spec §4.1,
/// §7 "Load-time validation ... fatal").
pub fn validate_program(raw: &[RawOp]) -> Result<Vec<Opcode>> {
    raw.iter().map(validate_op).collect()
}

fn validate_op(raw: &RawOp) -> Result<Opcode> {
    let tag: OpTag = raw
        .tag
        .parse()
        .with_context(|| format!("unknown opcode tag `{}`", raw.tag))?;
    let args = raw.args.iter().map(validate_arg).collect::<Result<_>>()?;
    Ok(Opcode { tag, args })
}

fn validate_arg(raw: &RawArg) -> Result<Arg> {
    Ok(match raw {
        RawArg::Lit(v) => Arg::Lit(v.clone()),
        RawArg::Var(name) => Arg::Var(name.clone()),
        RawArg::Op(op) => Arg::Op(Box::new(validate_op(op)?)),
        RawArg::Body(body) => Arg::Body(validate_program(body)?),
    })
}

/// The whole-program wire shape (spec §2 "a top-level opcode stream plus
/// event-handler blocks"): the flat stream `load_program` used to spawn
/// alone, plus zero or more named handler blocks the Event Registry
/// registers at load time (spec §4.5 `register_mes_block`).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RawProgram {
    pub top_level: Vec<RawOp>,
    #[cfg_attr(feature = "serialization", serde(default))]
    pub handlers: Vec<RawHandler>,
}

/// One `mes()` block: an event type (and, for `USER`, a user id) plus the
/// mode its instantiated Sequencers run in.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RawHandler {
    pub event_type: String,
    pub mode: String,
    pub commands: Vec<RawOp>,
    #[cfg_attr(feature = "serialization", serde(default))]
    pub user_id: Option<i64>,
}

/// Convenience builders used heavily by tests and by any future compiler
/// shim; not part of the validated-IR contract itself.
impl RawOp {
    pub fn new(tag: impl Into<String>, args: Vec<RawArg>) -> Self {
        Self {
            tag: tag.into(),
            args,
        }
    }
}

pub fn bail_unknown_tag(tag: &str) -> Result<()> {
    bail!("unknown opcode tag `{tag}`")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_tag() {
        let raw = vec![RawOp::new("frobnicate", vec![])];
        let err = validate_program(&raw).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn rejects_unknown_tag_nested_in_body() {
        let raw = vec![RawOp::new(
            "if",
            vec![RawArg::Body(vec![RawOp::new("nonsense", vec![])])],
        )];
        assert!(validate_program(&raw).is_err());
    }

    #[test]
    fn accepts_every_known_tag() {
        use strum::IntoEnumIterator;
        for tag in OpTag::iter() {
            let raw = vec![RawOp::new(tag.to_string(), vec![])];
            assert!(
                validate_program(&raw).is_ok(),
                "tag {tag} should validate"
            );
        }
    }
}
