//! Owns every sequencer, the global variable store, and the event registry —
//! the state the spec places behind the "VM lock" (spec §3 "Engine State",
//! §5). Thread-safety itself is the caller's job: the root crate wraps a
//! `Vm` in a `Mutex` the way it wraps render state in a render lock.

use std::rc::Rc;

use filly_core::{EventType, MesParams, Mode, Opcode, Value, VarTable};
use log::debug;

use crate::intrinsics::IntrinsicHost;
use crate::interpreter;
use crate::registry::EventRegistry;
use crate::sequencer::{Sequencer, SequencerId};

/// Per-tick op budget for a single sequencer, bounding worst-case latency
/// when a script has no `wait`s (spec §4.3 "Yield discipline").
pub const OP_CAP: u32 = 2_000;

/// Loop-iteration safety cap for `for`/`while`/`do-while` (spec §4.3 "Safety
/// cap").
pub const LOOP_SAFETY_CAP: u32 = 20_000;

pub struct Vm {
    sequencers: Vec<Option<Sequencer>>,
    pub(crate) globals: VarTable,
    pub(crate) registry: EventRegistry,
    next_group_id: u32,
    pub ppq: u32,
    terminated: bool,
}

impl Vm {
    pub fn new(ppq: u32) -> Self {
        Self {
            sequencers: Vec::new(),
            globals: VarTable::new(),
            registry: EventRegistry::new(),
            next_group_id: 0,
            ppq,
            terminated: false,
        }
    }

    /// Clears every collection and counter to defaults (spec §3 "Engine
    /// State" `reset()`).
    pub fn reset(&mut self) {
        self.sequencers.clear();
        self.globals.clear();
        self.registry = EventRegistry::new();
        self.next_group_id = 0;
        self.terminated = false;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn terminate(&mut self) {
        if !self.terminated {
            debug!("termination flag set");
        }
        self.terminated = true;
        for seq in self.sequencers.iter_mut().flatten() {
            seq.active = false;
        }
    }

    pub fn next_group_id(&mut self) -> u32 {
        let id = self.next_group_id;
        self.next_group_id += 1;
        id
    }

    pub fn sequencer(&self, id: SequencerId) -> Option<&Sequencer> {
        self.sequencers.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn sequencer_mut(&mut self, id: SequencerId) -> Option<&mut Sequencer> {
        self.sequencers.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn sequencer_ids(&self) -> Vec<SequencerId> {
        self.sequencers
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| SequencerId(i as u32)))
            .collect()
    }

    /// Spawns a new, independent sequencer (spec §4.5 "Triggering ...
    /// constructs a new Sequencer", §8 P1). Never mutates a template or any
    /// other sequencer.
    pub fn spawn_sequencer(
        &mut self,
        group_id: u32,
        commands: Rc<[Opcode]>,
        mode: Mode,
        no_loop: bool,
        parent: Option<SequencerId>,
    ) -> SequencerId {
        let id = SequencerId(self.sequencers.len() as u32);
        self.sequencers
            .push(Some(Sequencer::new(id, group_id, commands, mode, no_loop, parent)));
        id
    }

    pub fn register_mes_block(
        &mut self,
        event_type: EventType,
        commands: Rc<[Opcode]>,
        mode: Mode,
        parent: Option<SequencerId>,
        user_id: Option<i64>,
    ) -> u32 {
        let handler_id = self
            .registry
            .register(event_type, commands.clone(), mode, parent, user_id);
        if event_type.runs_continuously() {
            let group_id = self.next_group_id();
            self.spawn_sequencer(group_id, commands, mode, false, parent);
        }
        handler_id
    }

    fn instantiate_from_template(&mut self, template_id: u32, params: MesParams) {
        let Some(template) = self.registry_template(template_id) else {
            return;
        };
        let group_id = self.next_group_id();
        let id = self.spawn_sequencer(
            group_id,
            template.commands,
            template.mode,
            false,
            template.parent,
        );
        let seq = self.sequencer_mut(id).expect("just spawned");
        for (name, value) in MesParams::var_names().into_iter().zip(params.values()) {
            seq.vars.set(name, Value::Int(value));
        }
    }

    /// Snapshot of the fields of a template we need after releasing the
    /// borrow on `self.registry` (Rc clone keeps `commands` cheap).
    fn registry_template(&self, id: u32) -> Option<TemplateSnapshot> {
        self.registry
            .by_id(id)
            .map(|t| TemplateSnapshot {
                commands: t.commands.clone(),
                mode: t.mode,
                parent: t.parent,
            })
    }

    /// Enumerates every active template of `event_type` and instantiates one
    /// fresh sequencer per template (spec §4.5 "Triggering", §8 P1).
    pub fn trigger(&mut self, event_type: EventType, params: MesParams) {
        let ids: Vec<u32> = self.registry.matching(event_type).map(|t| t.id).collect();
        for id in ids {
            self.instantiate_from_template(id, params);
        }
    }

    pub fn trigger_user(&mut self, user_id: i64, params: MesParams) {
        let ids: Vec<u32> = self.registry.matching_user(user_id).map(|t| t.id).collect();
        for id in ids {
            self.instantiate_from_template(id, params);
        }
    }

    /// "All sequences complete": no active sequencer exists AND no
    /// `MIDI_TIME` handler templates exist while MIDI is playing (spec
    /// §4.5).
    pub fn all_sequences_complete(&self, midi_playing: bool) -> bool {
        let no_active = self.sequencers.iter().flatten().all(|s| !s.active);
        let no_midi_handlers = !midi_playing || !self.registry.has_active(EventType::MidiTime);
        no_active && no_midi_handlers
    }

    // -- Sequence lifecycle intrinsics (spec §4.8) --------------------------

    /// Deactivates `id`. If its mode is `MIDI_TIME` and another active
    /// `MIDI_TIME` sequencer exists, playback continues; otherwise sets the
    /// termination flag (spec §8 scenario 6).
    pub fn del_me(&mut self, id: SequencerId) {
        let Some(seq) = self.sequencer_mut(id) else {
            return;
        };
        seq.active = false;
        let mode = seq.mode;
        if mode == Mode::MidiTime {
            let other_midi_active = self
                .sequencers
                .iter()
                .flatten()
                .any(|s| s.id != id && s.active && s.mode == Mode::MidiTime);
            if !other_midi_active {
                self.terminate();
            }
        } else {
            let any_active = self.sequencers.iter().flatten().any(|s| s.active);
            if !any_active {
                self.terminate();
            }
        }
    }

    pub fn del_us(&mut self, group_id: u32) {
        for seq in self.sequencers.iter_mut().flatten() {
            if seq.group_id == group_id {
                seq.active = false;
            }
        }
    }

    pub fn del_all(&mut self) {
        self.terminate();
    }

    pub fn exit_title(&mut self) {
        self.terminate();
    }

    // -- Variable access (spec §4.2) ----------------------------------------

    /// Reads straight from the global mirror, bypassing any sequencer's
    /// scope chain — what a host (or a debugger) observes from outside any
    /// particular sequencer (spec §3 "Engine State... global variable
    /// store").
    pub fn global_var(&self, name: &str) -> Value {
        self.globals.get(name).cloned().unwrap_or_default()
    }

    pub fn get_var(&self, id: SequencerId, name: &str) -> Value {
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let Some(seq) = self.sequencer(cid) else {
                break;
            };
            if let Some(v) = seq.vars.get(name) {
                return v.clone();
            }
            cur = seq.parent;
        }
        self.globals.get(name).cloned().unwrap_or_default()
    }

    /// `set(name, value)`: updates in situ at the lowest scope that already
    /// owns `name`, else creates it in `id`'s own scope; mirrors into the
    /// global store either way (spec §4.2, §8 P6).
    pub fn set_var(&mut self, id: SequencerId, name: &str, value: Value) {
        let owner = self.find_owner(id, name).unwrap_or(id);
        if let Some(seq) = self.sequencer_mut(owner) {
            seq.vars.set(name, value.clone());
        }
        self.globals.set(name, value);
    }

    fn find_owner(&self, id: SequencerId, name: &str) -> Option<SequencerId> {
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let seq = self.sequencer(cid)?;
            if seq.vars.contains(name) {
                return Some(cid);
            }
            cur = seq.parent;
        }
        None
    }

    pub fn get_elem(&self, id: SequencerId, name: &str, i: usize) -> Value {
        match self.get_var(id, name) {
            Value::IntArray(a) => Value::Int(filly_core::scope::get_int_elem(&a, i)),
            Value::StrArray(a) => Value::Str(filly_core::scope::get_str_elem(&a, i)),
            _ => Value::Int(0),
        }
    }

    /// `size(name)` (spec §4.9 "arrays"): 0 for a non-array variable.
    pub fn array_size(&self, id: SequencerId, name: &str) -> i64 {
        match self.get_var(id, name) {
            Value::IntArray(a) => a.len() as i64,
            Value::StrArray(a) => a.len() as i64,
            _ => 0,
        }
    }

    /// `clear(name)`: empties an existing array in place, or creates an empty
    /// int array if `name` was not already an array.
    pub fn array_clear(&mut self, id: SequencerId, name: &str) {
        let cleared = match self.get_var(id, name) {
            Value::StrArray(_) => Value::StrArray(Vec::new()),
            _ => Value::IntArray(Vec::new()),
        };
        self.set_var(id, name, cleared);
    }

    /// `delete-at(name, i)`: removes element `i`, shifting later elements
    /// down. Out-of-range indices are a no-op.
    pub fn array_delete_at(&mut self, id: SequencerId, name: &str, i: usize) {
        let updated = match self.get_var(id, name) {
            Value::IntArray(mut a) => {
                if i < a.len() {
                    a.remove(i);
                }
                Value::IntArray(a)
            }
            Value::StrArray(mut a) => {
                if i < a.len() {
                    a.remove(i);
                }
                Value::StrArray(a)
            }
            other => other,
        };
        self.set_var(id, name, updated);
    }

    /// `insert-at(name, i, v)`: inserts `v` at position `i`, growing the
    /// array by one and shifting later elements up. An `i` beyond the
    /// current length appends at the end (auto-expansion spirit of §4.2,
    /// without the zero-fill gap an out-of-range `set_elem` would leave).
    pub fn array_insert_at(&mut self, id: SequencerId, name: &str, i: usize, value: Value) {
        let updated = match (self.get_var(id, name), value) {
            (Value::IntArray(mut a), Value::Int(n)) => {
                a.insert(i.min(a.len()), n);
                Value::IntArray(a)
            }
            (Value::StrArray(mut a), Value::Str(s)) => {
                a.insert(i.min(a.len()), s);
                Value::StrArray(a)
            }
            (_, Value::Int(n)) => Value::IntArray(vec![n]),
            (_, Value::Str(s)) => Value::StrArray(vec![s]),
            (other, _) => other,
        };
        self.set_var(id, name, updated);
    }

    pub fn set_elem(&mut self, id: SequencerId, name: &str, i: usize, value: Value) {
        let owner = self.find_owner(id, name).unwrap_or(id);
        let current = self
            .sequencer(owner)
            .and_then(|s| s.vars.get(name))
            .cloned()
            .unwrap_or(Value::Nil);
        let updated = match (current, value) {
            (Value::IntArray(mut a), Value::Int(n)) => {
                filly_core::scope::set_int_elem(&mut a, i, n);
                Value::IntArray(a)
            }
            (Value::StrArray(mut a), Value::Str(s)) => {
                filly_core::scope::set_str_elem(&mut a, i, s);
                Value::StrArray(a)
            }
            (_, Value::Int(n)) => {
                let mut a = Vec::new();
                filly_core::scope::set_int_elem(&mut a, i, n);
                Value::IntArray(a)
            }
            (_, Value::Str(s)) => {
                let mut a = Vec::new();
                filly_core::scope::set_str_elem(&mut a, i, s);
                Value::StrArray(a)
            }
            (other, _) => other,
        };
        if let Some(seq) = self.sequencer_mut(owner) {
            seq.vars.set(name, updated.clone());
        }
        self.globals.set(name, updated);
    }

    // -- Scheduling (spec §4.4) ----------------------------------------------

    /// Called once per rendered frame. Advances every active `TIME`
    /// sequencer by one tick.
    pub fn tick_frame(&mut self, host: &mut dyn IntrinsicHost) {
        if self.terminated {
            return;
        }
        self.tick_domain(Mode::Time, 1, host);
    }

    /// Called with the integer tick delta reported by the Tick Generator.
    /// Advances every active `MIDI_TIME` sequencer by exactly `n` ticks.
    pub fn tick_midi(&mut self, n: u32, host: &mut dyn IntrinsicHost) {
        if self.terminated || n == 0 {
            return;
        }
        self.tick_domain(Mode::MidiTime, n, host);
    }

    fn tick_domain(&mut self, mode: Mode, ticks: u32, host: &mut dyn IntrinsicHost) {
        for _ in 0..ticks {
            if self.terminated {
                return;
            }
            let ids = self.sequencer_ids();
            for id in ids {
                self.tick_one(id, mode, host);
            }
        }
    }

    fn tick_one(&mut self, id: SequencerId, domain: Mode, host: &mut dyn IntrinsicHost) {
        let Some(seq) = self.sequencer(id) else {
            return;
        };
        if !seq.active || seq.mode != domain {
            return;
        }
        if seq.is_waiting() {
            self.sequencer_mut(id).unwrap().decrement_wait();
            return;
        }
        if seq.is_complete() {
            let seq = self.sequencer_mut(id).unwrap();
            if seq.no_loop {
                // Spec §8 P5: `no_loop == true` halts for good, rather than
                // looping forever returning early every tick.
                seq.active = false;
                return;
            } else if !seq.commands().is_empty() {
                seq.restart();
            } else {
                return;
            }
        }
        interpreter::run_sequencer(self, id, host);
    }
}

struct TemplateSnapshot {
    commands: Rc<[Opcode]>,
    mode: Mode,
    parent: Option<SequencerId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use filly_core::{validate_program, EventType, RawArg, RawOp};

    fn lit(n: i64) -> RawArg {
        RawArg::Op(RawOp::new("literal", vec![RawArg::Lit(Value::Int(n))]))
    }

    fn assign(name: &str, value: i64) -> RawOp {
        RawOp::new("assign", vec![RawArg::Var(name.to_string()), lit(value)])
    }

    fn wait(k: i64) -> RawOp {
        RawOp::new("wait", vec![lit(k)])
    }

    fn set_step(n: i64) -> RawOp {
        RawOp::new("set-step", vec![lit(n)])
    }

    fn build(raws: Vec<RawOp>) -> Rc<[Opcode]> {
        Rc::from(validate_program(&raws).unwrap())
    }

    #[test]
    fn scenario_1_serial_assigns_complete_in_one_tick() {
        let commands = build(vec![assign("x", 1), assign("y", 2), assign("z", 3)]);
        let mut vm = Vm::new(480);
        let id = vm.spawn_sequencer(0, commands, Mode::Time, false, None);
        let mut host = NullIntrinsicHost;
        vm.tick_frame(&mut host);
        assert_eq!(vm.get_var(id, "x"), Value::Int(1));
        assert_eq!(vm.get_var(id, "y"), Value::Int(2));
        assert_eq!(vm.get_var(id, "z"), Value::Int(3));
        assert!(vm.sequencer(id).unwrap().is_complete());
    }

    #[test]
    fn scenario_2_wait_in_time_mode_counts_default_step() {
        // default ticks_per_step = 3; wait(2) => wait_count = 6.
        let commands = build(vec![assign("x", 1), wait(2), assign("y", 2)]);
        let mut vm = Vm::new(480);
        let id = vm.spawn_sequencer(0, commands, Mode::Time, false, None);
        let mut host = NullIntrinsicHost;

        vm.tick_frame(&mut host); // executes assign(x,1) and wait -> yields
        assert_eq!(vm.get_var(id, "x"), Value::Int(1));
        assert_eq!(vm.get_var(id, "y"), Value::Int(0));

        // 6 more ticks just count wait_count down from 6 to 0 without
        // running anything; the op after `wait` only runs on the following
        // tick once `is_waiting()` reads false at the top of `tick_one`.
        for _ in 0..6 {
            vm.tick_frame(&mut host);
        }
        assert_eq!(vm.get_var(id, "y"), Value::Int(0));

        vm.tick_frame(&mut host);
        assert_eq!(vm.get_var(id, "y"), Value::Int(2));
    }

    #[test]
    fn scenario_3_wait_in_midi_time_mode_uses_ppq() {
        let commands = build(vec![set_step(8), wait(1), assign("done", 1)]);
        let mut vm = Vm::new(480);
        let id = vm.spawn_sequencer(0, commands, Mode::MidiTime, false, None);
        let mut host = NullIntrinsicHost;

        // set-step(8) at ppq 480 sets ticks_per_step to (480/8)*8 = 480, so
        // wait(1) sets wait_count = 480. 1 tick runs set-step+wait, 480 more
        // just count wait_count down to 0, and the 482nd finally runs
        // assign(done, 1).
        vm.tick_midi(481, &mut host);
        assert_eq!(vm.get_var(id, "done"), Value::Int(0));
        vm.tick_midi(1, &mut host);
        assert_eq!(vm.get_var(id, "done"), Value::Int(1));
    }

    #[test]
    fn scenario_4_event_independence() {
        let commands = build(vec![RawOp::new(
            "assign",
            vec![RawArg::Var("x".to_string()), RawArg::Op(RawOp::new("var-ref", vec![RawArg::Var("MesP1".to_string())]))],
        )]);
        let mut vm = Vm::new(480);
        vm.register_mes_block(EventType::Key, commands, Mode::Time, None, None);
        vm.trigger(EventType::Key, MesParams(100, 0, 0, 0));
        vm.trigger(EventType::Key, MesParams(200, 0, 0, 0));

        let mut host = NullIntrinsicHost;
        vm.tick_frame(&mut host);

        let ids = vm.sequencer_ids();
        assert_eq!(ids.len(), 2);
        let mut values: Vec<i64> = ids.iter().map(|id| vm.get_var(*id, "x").as_int()).collect();
        values.sort();
        assert_eq!(values, vec![100, 200]);
    }

    #[test]
    fn scenario_6_del_me_does_not_terminate_with_surviving_midi_sequencer() {
        let deleter = build(vec![RawOp::new("call", vec![RawArg::Lit(Value::from("del_me"))])]);
        let survivor = build(vec![assign("alive", 1)]);
        let mut vm = Vm::new(480);
        vm.spawn_sequencer(0, deleter, Mode::MidiTime, false, None);
        let survivor_id = vm.spawn_sequencer(1, survivor, Mode::MidiTime, false, None);

        // A host that errors on anything it's asked to handle: if `del_me`
        // were not intercepted before reaching the host, this test would
        // fail instead of passing by accident.
        struct LifecycleHost;
        impl IntrinsicHost for LifecycleHost {
            fn call(&mut self, name: &str, _args: &[Value]) -> anyhow::Result<Value> {
                anyhow::bail!("unhandled `{name}` in test host")
            }
        }
        let mut host = LifecycleHost;
        vm.tick_midi(1, &mut host);

        assert!(!vm.is_terminated());
        assert_eq!(vm.get_var(survivor_id, "alive"), Value::Int(1));
    }

    #[test]
    fn scope_chain_shares_preexisting_parent_vars_but_not_new_child_ones() {
        // spec §8 P6: a child observes the parent's existing vars, and a
        // write to a pre-existing name propagates back up; a name the child
        // invents itself stays local to the child.
        let parent_commands = build(vec![assign("shared", 1)]);
        let mut vm = Vm::new(480);
        let parent_id = vm.spawn_sequencer(0, parent_commands, Mode::Time, false, None);
        let mut host = NullIntrinsicHost;
        vm.tick_frame(&mut host);
        assert_eq!(vm.get_var(parent_id, "shared"), Value::Int(1));

        let child_commands = build(vec![assign("shared", 2), assign("local", 9)]);
        let child_id = vm.spawn_sequencer(0, child_commands, Mode::Time, false, Some(parent_id));
        vm.tick_frame(&mut host);

        assert_eq!(vm.get_var(child_id, "shared"), Value::Int(2));
        assert_eq!(vm.get_var(parent_id, "shared"), Value::Int(2));
        assert_eq!(vm.get_var(child_id, "local"), Value::Int(9));
        // `local` was never in the parent's own scope, so the parent doesn't
        // see it even though it could walk up to find `shared`.
        assert!(!vm.sequencer(parent_id).unwrap().vars.contains("local"));
    }

    #[test]
    fn termination_drains_every_sequencer_without_running_another_op() {
        // spec §8 P11: once terminated, no sequencer executes another op,
        // even one that was mid-way through its own command list.
        let commands = build(vec![assign("x", 1), assign("y", 2)]);
        let mut vm = Vm::new(480);
        let id = vm.spawn_sequencer(0, commands, Mode::Time, false, None);
        let mut host = NullIntrinsicHost;

        vm.terminate();
        vm.tick_frame(&mut host);

        assert!(vm.is_terminated());
        assert_eq!(vm.get_var(id, "x"), Value::Int(0));
        assert_eq!(vm.get_var(id, "y"), Value::Int(0));
    }

    #[test]
    fn array_intrinsics_mutate_the_caller_scope_by_name() {
        let commands = build(vec![
            RawOp::new(
                "assign-array",
                vec![RawArg::Var("a".to_string()), lit(0), lit(10)],
            ),
            RawOp::new(
                "assign-array",
                vec![RawArg::Var("a".to_string()), lit(1), lit(20)],
            ),
            RawOp::new(
                "call",
                vec![
                    RawArg::Lit(Value::from("insert-at")),
                    RawArg::Var("a".to_string()),
                    RawArg::Lit(Value::Int(1)),
                    RawArg::Lit(Value::Int(99)),
                ],
            ),
            RawOp::new(
                "assign",
                vec![
                    RawArg::Var("n".to_string()),
                    RawArg::Op(RawOp::new("call", vec![RawArg::Lit(Value::from("size")), RawArg::Var("a".to_string())])),
                ],
            ),
        ]);
        let mut vm = Vm::new(480);
        let id = vm.spawn_sequencer(0, commands, Mode::Time, false, None);
        let mut host = NullIntrinsicHost;
        vm.tick_frame(&mut host);

        assert_eq!(vm.get_var(id, "n"), Value::Int(3));
        assert_eq!(vm.get_elem(id, "a", 0), Value::Int(10));
        assert_eq!(vm.get_elem(id, "a", 1), Value::Int(99));
        assert_eq!(vm.get_elem(id, "a", 2), Value::Int(20));
    }
}
