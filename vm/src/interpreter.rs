//! Single-op evaluator and the frame-stack control-flow machine that lets
//! `wait` suspend at any nesting depth (spec §4.3, §9 "Step-block inlining").

use std::rc::Rc;

use anyhow::{bail, Result};
use filly_core::{Arg, Mode, OpTag, Opcode, Value};
use log::warn;

use crate::intrinsics::IntrinsicHost;
use crate::ops::{apply_infix, apply_prefix};
use crate::sequencer::{Frame, Resume, SequencerId};
use crate::vm::{Vm, LOOP_SAFETY_CAP, OP_CAP};

/// What executing one statement-position opcode did to control flow.
enum Outcome {
    Normal,
    Yield,
    Break,
    Continue,
}

/// Drives `id` for up to [`OP_CAP`] real (non-housekeeping) ops, stopping
/// early on `wait`, sequencer completion, or a fatal interpreter error (spec
/// §4.4 "Per-tick algorithm" step 5).
pub fn run_sequencer(vm: &mut Vm, id: SequencerId, host: &mut dyn IntrinsicHost) {
    let mut ops_executed = 0u32;
    loop {
        if ops_executed >= OP_CAP {
            break;
        }
        if vm.sequencer(id).map(|s| s.at_frame_end()).unwrap_or(true) {
            if !resolve_frame_end(vm, id, host) {
                break;
            }
            continue;
        }
        let op = {
            let seq = vm.sequencer(id).expect("checked above");
            let frame = seq.current_frame();
            frame.body[frame.pc].clone()
        };
        vm.sequencer_mut(id).unwrap().current_frame_mut().pc += 1;

        let outcome = match execute_stmt(vm, id, &op, host) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("sequencer {} terminated by interpreter error: {e:#}", id.0);
                vm.del_me(id);
                break;
            }
        };
        ops_executed += 1;
        match outcome {
            Outcome::Normal => {}
            Outcome::Yield => break,
            Outcome::Break => unwind_break(vm, id),
            Outcome::Continue => unwind_continue(vm, id),
        }
    }
}

/// The current frame ran off its body. Resolves via its [`Resume`] kind;
/// returns `false` only when the base (`Top`) frame has ended, meaning the
/// sequencer is done for this tick.
fn resolve_frame_end(vm: &mut Vm, id: SequencerId, host: &mut dyn IntrinsicHost) -> bool {
    let resume = {
        let seq = vm.sequencer(id).expect("alive while ticking");
        seq.current_frame().resume.clone()
    };
    match resume {
        Resume::Top => false,
        Resume::Step | Resume::If | Resume::Switch => {
            vm.sequencer_mut(id).unwrap().pop_frame();
            true
        }
        Resume::For { update, cond } => {
            run_statement_ignoring_yield(vm, id, &update, host);
            let cont = eval_expr(vm, id, &cond, host).map(|v| v.truthy()).unwrap_or(false);
            restart_or_pop(vm, id, cont)
        }
        Resume::While { cond } | Resume::DoWhile { cond } => {
            let cont = eval_expr(vm, id, &cond, host).map(|v| v.truthy()).unwrap_or(false);
            restart_or_pop(vm, id, cont)
        }
    }
}

fn restart_or_pop(vm: &mut Vm, id: SequencerId, should_continue: bool) -> bool {
    let seq = vm.sequencer_mut(id).expect("alive while ticking");
    if should_continue {
        let frame = seq.current_frame_mut();
        frame.iterations += 1;
        if frame.iterations > LOOP_SAFETY_CAP {
            warn!("sequencer {} hit the loop safety cap, terminating loop", id.0);
            seq.pop_frame();
        } else {
            frame.pc = 0;
        }
    } else {
        seq.pop_frame();
    }
    true
}

/// `for`/`while` update and condition re-evaluation never suspend; a `wait`
/// reached there is a script error we log and ignore rather than propagate
/// (spec is silent on this edge case; init/update/cond are defined as
/// expressions, not bodies, so they cannot contain `wait` in a
/// spec-conformant program).
fn run_statement_ignoring_yield(vm: &mut Vm, id: SequencerId, op: &Opcode, host: &mut dyn IntrinsicHost) {
    if let Err(e) = execute_stmt(vm, id, op, host) {
        warn!("error evaluating loop update: {e:#}");
    }
}

fn unwind_break(vm: &mut Vm, id: SequencerId) {
    loop {
        let Some(seq) = vm.sequencer_mut(id) else { return };
        let resume = seq.current_frame().resume.clone();
        match resume {
            Resume::Top => {
                warn!("sequencer {} hit `break` outside any loop or switch", id.0);
                return;
            }
            Resume::If | Resume::Step => {
                seq.pop_frame();
            }
            Resume::Switch | Resume::For { .. } | Resume::While { .. } | Resume::DoWhile { .. } => {
                seq.pop_frame();
                return;
            }
        }
    }
}

fn unwind_continue(vm: &mut Vm, id: SequencerId) {
    loop {
        let Some(seq) = vm.sequencer_mut(id) else { return };
        let resume = seq.current_frame().resume.clone();
        match resume {
            Resume::Top => {
                warn!("sequencer {} hit `continue` outside any loop", id.0);
                return;
            }
            Resume::If | Resume::Step | Resume::Switch => {
                seq.pop_frame();
            }
            Resume::For { .. } | Resume::While { .. } | Resume::DoWhile { .. } => {
                let frame = seq.current_frame_mut();
                frame.pc = frame.body.len();
                return;
            }
        }
    }
}

fn arg_op<'a>(op: &'a Opcode, i: usize) -> Result<&'a Opcode> {
    match op.args.get(i) {
        Some(Arg::Op(o)) => Ok(o),
        _ => bail!("{:?} expects an expression argument at position {i}", op.tag),
    }
}

fn arg_lit_str(op: &Opcode, i: usize) -> Result<String> {
    match op.args.get(i) {
        Some(Arg::Lit(v)) => Ok(v.as_str()),
        Some(Arg::Var(name)) => Ok(name.clone()),
        _ => bail!("{:?} expects a literal/name argument at position {i}", op.tag),
    }
}

fn arg_var_name(op: &Opcode, i: usize) -> Result<&str> {
    match op.args.get(i) {
        Some(Arg::Var(name)) => Ok(name.as_str()),
        _ => bail!("{:?} expects a variable-name argument at position {i}", op.tag),
    }
}

fn arg_body<'a>(op: &'a Opcode, i: usize) -> Result<&'a [Opcode]> {
    match op.args.get(i) {
        Some(Arg::Body(b)) => Ok(b),
        _ => bail!("{:?} expects a body argument at position {i}", op.tag),
    }
}

/// Evaluates an argument slot to a runtime [`Value`]. `Body` arguments are
/// never valid here.
fn eval_arg(vm: &mut Vm, id: SequencerId, arg: &Arg, host: &mut dyn IntrinsicHost) -> Result<Value> {
    match arg {
        Arg::Lit(v) => Ok(v.clone()),
        Arg::Var(name) => Ok(vm.get_var(id, name)),
        Arg::Op(op) => eval_expr(vm, id, op, host),
        Arg::Body(_) => bail!("a body argument cannot be evaluated as an expression"),
    }
}

fn eval_expr(vm: &mut Vm, id: SequencerId, op: &Opcode, host: &mut dyn IntrinsicHost) -> Result<Value> {
    match op.tag {
        OpTag::Literal => {
            let arg = op.args.first().cloned().unwrap_or(Arg::Lit(Value::Nil));
            eval_arg(vm, id, &arg, host)
        }
        OpTag::VarRef => Ok(vm.get_var(id, arg_var_name(op, 0)?)),
        OpTag::Infix => {
            let opname = arg_lit_str(op, 0)?;
            let l = eval_arg(vm, id, op.args.get(1).ok_or_else(|| anyhow::anyhow!("infix missing lhs"))?, host)?;
            let r = eval_arg(vm, id, op.args.get(2).ok_or_else(|| anyhow::anyhow!("infix missing rhs"))?, host)?;
            Ok(apply_infix(&opname, l, r))
        }
        OpTag::Prefix => {
            let opname = arg_lit_str(op, 0)?;
            let x = eval_arg(vm, id, op.args.get(1).ok_or_else(|| anyhow::anyhow!("prefix missing operand"))?, host)?;
            Ok(apply_prefix(&opname, x))
        }
        OpTag::Index => {
            let name = arg_var_name(op, 0)?.to_string();
            let idx = eval_arg(vm, id, op.args.get(1).ok_or_else(|| anyhow::anyhow!("index missing i"))?, host)?.as_int();
            Ok(vm.get_elem(id, &name, idx.max(0) as usize))
        }
        OpTag::Call => {
            let name = arg_lit_str(op, 0)?;
            if let Some(result) = dispatch_array_call(vm, id, &name, op)? {
                return Ok(result);
            }
            let mut args = Vec::with_capacity(op.args.len().saturating_sub(1));
            for a in op.args.iter().skip(1) {
                args.push(eval_arg(vm, id, a, host)?);
            }
            dispatch_call(vm, id, &name, &args, host)
        }
        other => bail!("{other:?} is not valid in expression position"),
    }
}

/// Sequence-lifecycle intrinsics (spec §4.8) are handled here, directly
/// against `vm`, since they mutate scheduler/registry state the host has no
/// business touching. Anything else falls through to the host's dispatch
/// table (spec §4.9); an unrecognized name there is fatal.
fn dispatch_call(
    vm: &mut Vm,
    id: SequencerId,
    name: &str,
    args: &[Value],
    host: &mut dyn IntrinsicHost,
) -> Result<Value> {
    match name.to_ascii_lowercase().as_str() {
        "del_me" => {
            vm.del_me(id);
            Ok(Value::ZERO)
        }
        "del_us" => {
            let group_id = vm.sequencer(id).map(|s| s.group_id).unwrap_or(0);
            vm.del_us(group_id);
            Ok(Value::ZERO)
        }
        "del_all" => {
            vm.del_all();
            Ok(Value::ZERO)
        }
        "exit_title" => {
            vm.exit_title();
            Ok(Value::ZERO)
        }
        "post_mes" => {
            let params = mes_params_from(args);
            if let Some(Value::Str(event_name)) = args.first() {
                if let Ok(event_type) = event_name.parse() {
                    vm.trigger(event_type, params);
                    return Ok(Value::ZERO);
                }
            }
            let user_id = args.first().map(|v| v.as_int()).unwrap_or(0);
            vm.trigger_user(user_id, params);
            Ok(Value::ZERO)
        }
        _ => host.call(name, args),
    }
}

/// Array intrinsics (spec §4.9) name their target variable by reference, not
/// by value, and mutate the calling sequencer's own scope — so they're
/// intercepted here, against the raw (unevaluated) call arguments, the same
/// way `index`/`assign-array` read `arg_var_name` rather than evaluating
/// their first argument. Returns `Ok(None)` for any other call name, leaving
/// it to the generic evaluated-argument dispatch path.
fn dispatch_array_call(
    vm: &mut Vm,
    id: SequencerId,
    name: &str,
    op: &Opcode,
) -> Result<Option<Value>> {
    let is_array_call = matches!(
        name.to_ascii_lowercase().as_str(),
        "size" | "clear" | "delete-at" | "delete_at" | "insert-at" | "insert_at"
    );
    if !is_array_call {
        return Ok(None);
    }
    let var_name = arg_var_name(op, 1)?.to_string();
    let result = match name.to_ascii_lowercase().as_str() {
        "size" => Value::Int(vm.array_size(id, &var_name)),
        "clear" => {
            vm.array_clear(id, &var_name);
            Value::ZERO
        }
        "delete-at" | "delete_at" => {
            let i = match op.args.get(2) {
                Some(Arg::Lit(v)) => v.as_int(),
                Some(Arg::Var(n)) => vm.get_var(id, n).as_int(),
                _ => 0,
            }
            .max(0) as usize;
            vm.array_delete_at(id, &var_name, i);
            Value::ZERO
        }
        "insert-at" | "insert_at" => {
            let i = match op.args.get(2) {
                Some(Arg::Lit(v)) => v.as_int(),
                Some(Arg::Var(n)) => vm.get_var(id, n).as_int(),
                _ => 0,
            }
            .max(0) as usize;
            let value = match op.args.get(3) {
                Some(Arg::Lit(v)) => v.clone(),
                Some(Arg::Var(n)) => vm.get_var(id, n),
                _ => Value::Int(0),
            };
            vm.array_insert_at(id, &var_name, i, value);
            Value::ZERO
        }
        _ => unreachable!(),
    };
    Ok(Some(result))
}

fn mes_params_from(args: &[Value]) -> filly_core::MesParams {
    let p = |i: usize| args.get(i).map(|v| v.as_int()).unwrap_or(0);
    filly_core::MesParams(p(1), p(2), p(3), p(4))
}

/// Executes one statement-position opcode (spec §4.3). Only `wait` yields.
fn execute_stmt(vm: &mut Vm, id: SequencerId, op: &Opcode, host: &mut dyn IntrinsicHost) -> Result<Outcome> {
    match op.tag {
        OpTag::Assign => {
            let name = arg_var_name(op, 0)?.to_string();
            let expr = arg_op(op, 1)?.clone();
            let v = eval_expr(vm, id, &expr, host)?;
            vm.set_var(id, &name, v);
            Ok(Outcome::Normal)
        }
        OpTag::AssignArray => {
            let name = arg_var_name(op, 0)?.to_string();
            let idx_op = arg_op(op, 1)?.clone();
            let expr_op = arg_op(op, 2)?.clone();
            let idx = eval_expr(vm, id, &idx_op, host)?.as_int().max(0) as usize;
            let v = eval_expr(vm, id, &expr_op, host)?;
            vm.set_elem(id, &name, idx, v);
            Ok(Outcome::Normal)
        }
        OpTag::Call => {
            eval_expr(vm, id, op, host)?;
            Ok(Outcome::Normal)
        }
        OpTag::Wait => {
            let k = eval_arg(vm, id, op.args.first().ok_or_else(|| anyhow::anyhow!("wait missing k"))?, host)?
                .as_int()
                .max(0) as u32;
            let seq = vm.sequencer_mut(id).expect("alive");
            let ticks = k.saturating_mul(seq.ticks_per_step);
            seq.set_wait(ticks);
            Ok(Outcome::Yield)
        }
        OpTag::SetStep => {
            let n = eval_arg(vm, id, op.args.first().ok_or_else(|| anyhow::anyhow!("set-step missing n"))?, host)?
                .as_int()
                .max(0) as u32;
            let ppq = vm.ppq;
            let seq = vm.sequencer_mut(id).expect("alive");
            let ticks = seq.mode.ticks_per_step_for_set_step(n, ppq);
            seq.set_ticks_per_step(ticks);
            Ok(Outcome::Normal)
        }
        OpTag::Step => {
            let n = eval_arg(vm, id, op.args.first().ok_or_else(|| anyhow::anyhow!("step missing n"))?, host)?
                .as_int()
                .max(0) as u32;
            let body = arg_body(op, 1)?.to_vec();
            let ppq = vm.ppq;
            let seq = vm.sequencer_mut(id).expect("alive");
            let ticks = seq.mode.ticks_per_step_for_set_step(n, ppq);
            seq.set_ticks_per_step(ticks);
            seq.push_frame(Frame {
                body: Rc::from(body),
                pc: 0,
                resume: Resume::Step,
                iterations: 0,
            });
            Ok(Outcome::Normal)
        }
        OpTag::RegisterSequence => {
            let mode_name = arg_lit_str(op, 0)?;
            let mode: Mode = mode_name
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown mode `{mode_name}` in register-sequence"))?;
            let body = arg_body(op, 1)?.to_vec();
            // Inherits the triggering parent pointer so a handler block can
            // still read MesP1..MesP4 (spec §9 open question (b), flagged
            // fragile).
            let parent = vm.sequencer(id).and_then(|s| s.parent);
            let group_id = vm.next_group_id();
            vm.spawn_sequencer(group_id, Rc::from(body), mode, false, parent);
            Ok(Outcome::Normal)
        }
        OpTag::If => {
            let cond = arg_op(op, 0)?.clone();
            let truthy = eval_expr(vm, id, &cond, host)?.truthy();
            let body_idx = if truthy { 1 } else { 2 };
            let body = arg_body(op, body_idx).map(|b| b.to_vec()).unwrap_or_default();
            if !body.is_empty() {
                vm.sequencer_mut(id).unwrap().push_frame(Frame {
                    body: Rc::from(body),
                    pc: 0,
                    resume: Resume::If,
                    iterations: 0,
                });
            }
            Ok(Outcome::Normal)
        }
        OpTag::For => {
            let init = arg_op(op, 0)?.clone();
            let cond = arg_op(op, 1)?.clone();
            let update = arg_op(op, 2)?.clone();
            let body = arg_body(op, 3)?.to_vec();
            run_statement_ignoring_yield(vm, id, &init, host);
            let truthy = eval_expr(vm, id, &cond, host)?.truthy();
            if truthy {
                vm.sequencer_mut(id).unwrap().push_frame(Frame {
                    body: Rc::from(body),
                    pc: 0,
                    resume: Resume::For {
                        update: Rc::new(update),
                        cond: Rc::new(cond),
                    },
                    iterations: 0,
                });
            }
            Ok(Outcome::Normal)
        }
        OpTag::While => {
            let cond = arg_op(op, 0)?.clone();
            let body = arg_body(op, 1)?.to_vec();
            let truthy = eval_expr(vm, id, &cond, host)?.truthy();
            if truthy {
                vm.sequencer_mut(id).unwrap().push_frame(Frame {
                    body: Rc::from(body),
                    pc: 0,
                    resume: Resume::While { cond: Rc::new(cond) },
                    iterations: 0,
                });
            }
            Ok(Outcome::Normal)
        }
        OpTag::DoWhile => {
            let cond = arg_op(op, 0)?.clone();
            let body = arg_body(op, 1)?.to_vec();
            vm.sequencer_mut(id).unwrap().push_frame(Frame {
                body: Rc::from(body),
                pc: 0,
                resume: Resume::DoWhile { cond: Rc::new(cond) },
                iterations: 0,
            });
            Ok(Outcome::Normal)
        }
        OpTag::Switch => {
            let subject_op = arg_op(op, 0)?.clone();
            let subject = eval_expr(vm, id, &subject_op, host)?;
            let rest = &op.args[1..];
            let mut chosen: Option<Vec<Opcode>> = None;
            let mut i = 0;
            while i + 1 < rest.len() {
                if let (Arg::Lit(case_val), Arg::Body(body)) = (&rest[i], &rest[i + 1]) {
                    if values_equal(&subject, case_val) {
                        chosen = Some(body.clone());
                        break;
                    }
                }
                i += 2;
            }
            if chosen.is_none() && rest.len() % 2 == 1 {
                if let Some(Arg::Body(default_body)) = rest.last() {
                    chosen = Some(default_body.clone());
                }
            }
            if let Some(body) = chosen {
                if !body.is_empty() {
                    vm.sequencer_mut(id).unwrap().push_frame(Frame {
                        body: Rc::from(body),
                        pc: 0,
                        resume: Resume::Switch,
                        iterations: 0,
                    });
                }
            }
            Ok(Outcome::Normal)
        }
        OpTag::Break => Ok(Outcome::Break),
        OpTag::Continue => Ok(Outcome::Continue),
        // Expression tags occasionally appear bare as statements (their
        // value simply discarded); handle them by delegating to eval.
        OpTag::Literal | OpTag::VarRef | OpTag::Infix | OpTag::Prefix | OpTag::Index => {
            eval_expr(vm, id, op, host)?;
            Ok(Outcome::Normal)
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(_), _) | (_, Value::Str(_)) => a.as_str() == b.as_str(),
        _ => a.as_int() == b.as_int(),
    }
}
