//! A single cooperative execution context over a bytecode list (spec §4.2).

use std::rc::Rc;

use filly_core::{Mode, Opcode, VarTable};

/// An index into [`crate::Vm`]'s sequencer slab. Never reused once freed, so a
/// stale `parent` reference simply fails to resolve rather than aliasing a
/// newer, unrelated sequencer (spec §9 "Parent pointer").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequencerId(pub u32);

/// How a pushed [`Frame`] resumes its parent once its body is exhausted.
/// `step` splices its body inline and never revisits it; `if` just pops;
/// `for`/`while`/`do-while` re-evaluate their loop condition before deciding
/// whether to restart the body at `pc = 0` (spec §9 "Step-block inlining",
/// generalized to every control-flow body so `wait` can suspend at any
/// nesting depth).
#[derive(Clone, Debug)]
pub enum Resume {
    Top,
    Step,
    If,
    For {
        update: Rc<Opcode>,
        cond: Rc<Opcode>,
    },
    While {
        cond: Rc<Opcode>,
    },
    DoWhile {
        cond: Rc<Opcode>,
    },
    /// `switch` never loops; popping just returns control to the parent.
    Switch,
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub body: Rc<[Opcode]>,
    pub pc: usize,
    pub resume: Resume,
    /// Number of times this frame's body has restarted at `pc = 0`. Used to
    /// enforce the loop safety cap (spec §4.3 "Safety cap").
    pub iterations: u32,
}

impl Frame {
    fn top(commands: Rc<[Opcode]>) -> Self {
        Self {
            body: commands,
            pc: 0,
            resume: Resume::Top,
            iterations: 0,
        }
    }
}

/// One cooperative execution context (spec §3 "Sequencer").
pub struct Sequencer {
    pub id: SequencerId,
    pub group_id: u32,
    pub active: bool,
    pub wait_count: u32,
    pub ticks_per_step: u32,
    pub vars: VarTable,
    pub parent: Option<SequencerId>,
    pub mode: Mode,
    pub no_loop: bool,
    /// The commands this sequencer was created with; `frames[0].body` always
    /// aliases this so a completed sequencer that loops (`no_loop == false`)
    /// can restart at the top without re-fetching it.
    commands: Rc<[Opcode]>,
    frames: Vec<Frame>,
}

impl Sequencer {
    pub fn new(
        id: SequencerId,
        group_id: u32,
        commands: Rc<[Opcode]>,
        mode: Mode,
        no_loop: bool,
        parent: Option<SequencerId>,
    ) -> Self {
        let ticks_per_step = mode.default_ticks_per_step();
        Self {
            id,
            group_id,
            active: true,
            wait_count: 0,
            ticks_per_step,
            vars: VarTable::new(),
            parent,
            mode,
            no_loop,
            commands: commands.clone(),
            frames: vec![Frame::top(commands)],
        }
    }

    pub fn commands(&self) -> &Rc<[Opcode]> {
        &self.commands
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_count > 0
    }

    pub fn decrement_wait(&mut self) {
        if self.wait_count > 0 {
            self.wait_count -= 1;
        }
    }

    pub fn set_wait(&mut self, ticks: u32) {
        self.wait_count = ticks.max(1);
    }

    pub fn set_ticks_per_step(&mut self, ticks: u32) {
        self.ticks_per_step = ticks.max(1);
    }

    /// `pc >= len(commands)` at the top frame and not waiting (spec §4.2
    /// `is_complete`).
    pub fn is_complete(&self) -> bool {
        self.frames.len() == 1 && self.frames[0].pc >= self.frames[0].body.len()
    }

    /// Resets the top frame to the start, used by the loop policy (spec §4.4,
    /// §8 P5).
    pub fn restart(&mut self) {
        self.frames.truncate(1);
        self.frames[0].pc = 0;
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.frames
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("sequencer always has a frame")
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("sequencer always has a frame")
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("never pop the top frame")
    }

    pub fn at_frame_end(&self) -> bool {
        let f = self.current_frame();
        f.pc >= f.body.len()
    }
}
