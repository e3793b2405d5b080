// Cooperative interpreter (spec.md §4.5): a single OS thread scheduling
// many logical fble threads over a shared value heap. Each dispatch step
// executes exactly one instruction of the running thread's topmost
// frame; frames are pushed on `Call`, replaced in place on a tail `Call`
// (`exit: true`), and popped on `Return`.
//
// Abort handling: rather than hand-maintaining a mirrored "abort"
// implementation per instruction (necessary in the original C, which
// manages refcounts by hand), an aborting thread's frames are simply
// dropped through `release_frame`, which releases every still-occupied
// local back to the value heap — the same release traffic spec.md §4.5
// step 2's instruction-level abort paths describe, without duplicating
// run/abort logic per opcode.

use crate::bytecode::{CodeBlock, FrameIndex, FrameSection, Instr};
use crate::config::Config;
use crate::io::PortIo;
use crate::profile::ProfileSink;
use crate::value::{FuncValue, LinkValue, Value, ValueData};
use crate::value_heap::ValueHeap;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

struct Frame {
    code: Rc<CodeBlock>,
    pc: usize,
    locals: Vec<Option<Value>>,
    statics: Vec<Value>,
    /// Where this frame's eventual `Return` value should land in its
    /// caller, for a non-tail `Call`. `None` for the thread's outermost
    /// frame and for frames entered via a tail call (the tail call's own
    /// caller already recorded the destination it cares about).
    pending_call_dest: Option<FrameIndex>,
}

impl Frame {
    fn new(code: Rc<CodeBlock>, statics: Vec<Value>, args: Vec<Value>) -> Frame {
        let mut locals: Vec<Option<Value>> = vec![None; code.local_count];
        for (i, a) in args.into_iter().enumerate() {
            locals[i] = Some(a);
        }
        Frame { code, pc: 0, locals, statics, pending_call_dest: None }
    }

    fn get(&self, idx: FrameIndex) -> Value {
        match idx.section {
            FrameSection::Locals => self.locals[idx.index].expect("read of undefined local"),
            FrameSection::Statics => self.statics[idx.index],
        }
    }

    fn set(&mut self, idx: FrameIndex, v: Value) {
        match idx.section {
            FrameSection::Locals => self.locals[idx.index] = Some(v),
            FrameSection::Statics => panic!("cannot write to a static slot"),
        }
    }
}

type ThreadId = u64;

#[derive(Clone, Copy)]
enum Blocked {
    /// Parked on an empty link's `Get`; `dest` is where the eventually
    /// dequeued value lands once a matching `Put` wakes this thread
    /// (spec.md §4.5). `link` is recorded too so the scheduler's I/O poll
    /// (spec.md §6's "Value I/O callback") knows which port to retry.
    Get { link: Value, dest: FrameIndex },
    Join,
}

/// Bookkeeping for a thread's outstanding `Fork`, from the instruction
/// itself through the matching `Join`.
struct ForkState {
    remaining: usize,
    results: Vec<Option<Value>>,
    dests: Vec<FrameIndex>,
}

struct Thread {
    frames: Vec<Frame>,
    blocked: Option<Blocked>,
    fork: Option<ForkState>,
    /// Where to report this thread's final value, if it was spawned by a
    /// `Fork` rather than being the top-level thread: the parent's id and
    /// which fork result slot this thread fills.
    parent: Option<(ThreadId, usize)>,
    /// Stack of profiling blocks this thread is currently inside, driven
    /// by `ProfileOp::Enter`/`Replace`/`Exit` (spec.md §4.5 step 1). The
    /// top is the block a `sample` call attributes to.
    profile_blocks: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    /// An instruction's runtime check failed: an undefined union access,
    /// a vacuous recursive binding, calling a non-function value, and so
    /// on (spec.md §4.5's "instruction dispatch may abort").
    Aborted,
}

enum StepOutcome {
    Continue,
    Blocked,
    Finished(Value),
    Aborted,
}

pub struct Interpreter<'a> {
    pub values: ValueHeap,
    config: Config,
    profile: &'a mut dyn ProfileSink,
    io: &'a mut dyn PortIo,
    threads: HashMap<ThreadId, Thread>,
    runnable: VecDeque<ThreadId>,
    next_id: ThreadId,
    result: Option<Result<Value, RuntimeError>>,
    /// Links that stand for a top-level proc argument rather than an
    /// internally-`Link`-allocated channel, mapped to the port id the
    /// host's `PortIo` knows it by (spec.md §6). A `Get`/`Put` against any
    /// other link is purely internal and never touches `io`.
    external_ports: HashMap<Value, usize>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        config: Config,
        values: ValueHeap,
        profile: &'a mut dyn ProfileSink,
        io: &'a mut dyn PortIo,
    ) -> Interpreter<'a> {
        Interpreter {
            values,
            config,
            profile,
            io,
            threads: HashMap::new(),
            runnable: VecDeque::new(),
            next_id: 0,
            result: None,
            external_ports: HashMap::new(),
        }
    }

    /// Declare that `link`, wherever it flows as a `Get`/`Put` operand, is
    /// backed by the host's external port `port_id` rather than by
    /// another fble thread (spec.md §6). Must be called before `run` for
    /// any link passed in as a top-level proc argument.
    pub fn register_external_port(&mut self, link: Value, port_id: usize) {
        self.external_ports.insert(link, port_id);
    }

    /// Run `code` (a zero-static, zero-arg top-level program, the shape
    /// the linker produces, spec.md §4.6) to completion, returning its
    /// result or the fact that some thread aborted.
    pub fn run(&mut self, code: Rc<CodeBlock>) -> Result<Value, RuntimeError> {
        self.run_with_args(code, Vec::new())
    }

    /// Like `run`, but for a zero-static top-level program that itself
    /// takes arguments — the shape a top-level proc with external port
    /// arguments has (spec.md §6).
    pub fn run_with_args(&mut self, code: Rc<CodeBlock>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.spawn(code, Vec::new(), args, None);
        self.run_to_fixpoint();
        self.result.take().expect("top-level thread always reports a result")
    }

    fn spawn(&mut self, code: Rc<CodeBlock>, statics: Vec<Value>, args: Vec<Value>, parent: Option<(ThreadId, usize)>) -> ThreadId {
        let id = self.next_id;
        self.next_id += 1;
        crate::trace!("spawning thread {} (parent {:?})", id, parent);
        let frame = Frame::new(code, statics, args);
        self.threads.insert(
            id,
            Thread { frames: vec![frame], blocked: None, fork: None, parent, profile_blocks: Vec::new() },
        );
        self.runnable.push_back(id);
        id
    }

    /// Round-robin over runnable threads until neither any thread can
    /// advance nor any I/O poll makes progress (spec.md §4.5's scheduler
    /// fixed point). Advances at most `config.scheduler_step_budget`
    /// threads per round before giving I/O another chance to run — a
    /// host polling many external ports shouldn't be starved by a run of
    /// always-runnable internal threads.
    fn run_to_fixpoint(&mut self) {
        let budget = self.config.scheduler_step_budget.max(1);
        loop {
            let mut progressed = false;
            for _ in 0..budget {
                let id = match self.runnable.pop_front() {
                    Some(id) => id,
                    None => break,
                };
                progressed = true;
                self.run_thread(id);
                if self.result.is_some() {
                    return;
                }
            }
            if self.poll_blocked_gets() {
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    /// Give every thread parked on a `Get` against a registered external
    /// port a chance to pull a value from the host (spec.md §6's "Value
    /// I/O callback"). Threads blocked on a purely-internal link are left
    /// alone — only another fble thread's `Put` can wake those.
    fn poll_blocked_gets(&mut self) -> bool {
        let candidates: Vec<(ThreadId, Value, usize)> = self
            .threads
            .iter()
            .filter_map(|(id, t)| match t.blocked {
                Some(Blocked::Get { link, .. }) => {
                    self.external_ports.get(&link).map(|&port| (*id, link, port))
                }
                _ => None,
            })
            .collect();

        let mut progressed = false;
        for (id, link, port) in candidates {
            if let Some(v) = self.io.poll_get(port) {
                match self.values.get(link) {
                    ValueData::Link(l) => l.queue.borrow_mut().push_back(v),
                    _ => continue,
                }
                self.values.add_ref(link, v);
                self.resume_get(id, link);
                progressed = true;
            }
        }
        progressed
    }

    fn run_thread(&mut self, id: ThreadId) {
        loop {
            if !self.threads.contains_key(&id) {
                return;
            }
            match self.step(id) {
                StepOutcome::Continue => continue,
                StepOutcome::Blocked => return,
                StepOutcome::Finished(v) => {
                    self.finish_thread(id, Ok(v));
                    return;
                }
                StepOutcome::Aborted => {
                    self.abort_all();
                    return;
                }
            }
        }
    }

    fn finish_thread(&mut self, id: ThreadId, result: Result<Value, RuntimeError>) {
        let thread = self.threads.remove(&id).expect("finishing thread must exist");
        match thread.parent {
            Some((parent_id, slot)) => {
                if let Ok(v) = result {
                    let mut ready = false;
                    if let Some(parent) = self.threads.get_mut(&parent_id) {
                        if let Some(fork) = &mut parent.fork {
                            fork.results[slot] = Some(v);
                            fork.remaining -= 1;
                            ready = fork.remaining == 0;
                        }
                    }
                    if ready {
                        self.complete_fork(parent_id);
                    }
                }
            }
            None => self.result = Some(result),
        }
    }

    fn complete_fork(&mut self, parent_id: ThreadId) {
        let mut was_waiting_on_join = false;
        if let Some(parent) = self.threads.get_mut(&parent_id) {
            if let Some(fork) = parent.fork.take() {
                if let Some(frame) = parent.frames.last_mut() {
                    for (dest, v) in fork.dests.into_iter().zip(fork.results.into_iter()) {
                        frame.set(dest, v.expect("all fork children reported before completion"));
                    }
                }
                was_waiting_on_join = matches!(parent.blocked, Some(Blocked::Join));
                if was_waiting_on_join {
                    parent.blocked = None;
                    parent.frames.last_mut().unwrap().pc += 1;
                }
            }
        }
        if was_waiting_on_join {
            self.runnable.push_back(parent_id);
        }
    }

    fn abort_all(&mut self) {
        let ids: Vec<ThreadId> = self.threads.keys().copied().collect();
        for id in ids {
            if let Some(thread) = self.threads.remove(&id) {
                for frame in thread.frames {
                    self.release_frame(frame);
                }
            }
        }
        self.runnable.clear();
        self.result = Some(Err(RuntimeError::Aborted));
    }

    fn release_frame(&mut self, frame: Frame) {
        for slot in frame.locals.into_iter().flatten() {
            self.values.release(slot);
        }
    }

    /// Dispatch one instruction of `id`'s topmost frame (spec.md §4.5
    /// step 1: sample, then run). A GC increment is driven once per
    /// dispatched instruction, the way value_heap.rs's `gc_increment`
    /// doc comment describes.
    fn step(&mut self, id: ThreadId) -> StepOutcome {
        let pc = self.frame(id).pc;
        assert!(pc < self.frame(id).code.instrs.len(), "instruction pointer ran past the end of its code block");
        if self.should_sample() {
            let block = self.current_block(id);
            self.profile.sample(block);
        }
        let ops = self.frame(id).code.instrs[pc].profile.clone();
        for op in ops {
            match op {
                crate::bytecode::ProfileOp::Enter(block) => {
                    self.threads.get_mut(&id).unwrap().profile_blocks.push(block);
                    self.profile.enter(block);
                }
                crate::bytecode::ProfileOp::Replace(block) => {
                    let blocks = &mut self.threads.get_mut(&id).unwrap().profile_blocks;
                    blocks.pop();
                    blocks.push(block);
                    self.profile.exit();
                    self.profile.enter(block);
                }
                crate::bytecode::ProfileOp::Exit => {
                    self.threads.get_mut(&id).unwrap().profile_blocks.pop();
                    self.profile.exit();
                }
            }
        }

        let outcome = self.dispatch(id, pc);
        self.values.gc_increment();
        outcome
    }

    /// The innermost profiling block `id` is currently inside, or `0` if
    /// it hasn't entered one (spec.md §4.5 step 1's "the block currently
    /// being executed").
    fn current_block(&self, id: ThreadId) -> usize {
        self.threads[&id].profile_blocks.last().copied().unwrap_or(0)
    }

    /// A 1-in-`profile_sample_rate` probabilistic decision (spec.md §4.5
    /// step 1); `0` disables sampling entirely, `1` samples every
    /// instruction.
    fn should_sample(&self) -> bool {
        match self.config.profile_sample_rate {
            0 => false,
            1 => true,
            n => rand::thread_rng().gen_range(0..n) == 0,
        }
    }

    fn frame(&self, id: ThreadId) -> &Frame {
        self.threads[&id].frames.last().unwrap()
    }

    fn frame_mut(&mut self, id: ThreadId) -> &mut Frame {
        self.threads.get_mut(&id).unwrap().frames.last_mut().unwrap()
    }

    fn dispatch(&mut self, id: ThreadId, pc: usize) -> StepOutcome {
        // Each arm reads whatever operands it needs out of the frame
        // (copying `Value` handles, which are `Copy`) before calling into
        // `self.values`, so no arm holds a borrow of `self.threads` across
        // a recursive `&mut self` call.
        match &self.frame(id).code.instrs[pc].instr {
            Instr::DataType { field_count, dest, .. } => {
                let field_count = *field_count;
                let dest = *dest;
                let v = self.values.new_value(ValueData::DataType { field_count });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::StructValueType { dest, .. } | Instr::UnionValueType { dest, .. } => {
                let dest = *dest;
                let v = self.values.new_value(ValueData::DataType { field_count: 0 });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::StructValue { args, dest } => {
                let fields: Vec<Value> = args.iter().map(|a| self.frame(id).get(*a)).collect();
                let dest = *dest;
                let v = self.values.new_value(ValueData::Struct { fields });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::UnionValue { tag, arg, dest } => {
                let arg = self.frame(id).get(*arg);
                let tag = *tag;
                let dest = *dest;
                let v = self.values.new_value(ValueData::Union { tag, arg });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::StructAccess { obj, tag, dest } => {
                let obj = self.frame(id).get(*obj);
                let tag = *tag;
                let dest = *dest;
                let obj = match self.strict(obj) {
                    Some(v) => v,
                    None => return StepOutcome::Aborted,
                };
                match self.values.get(obj) {
                    ValueData::Struct { fields } => {
                        let v = fields[tag];
                        // `v` is reachable today only as a traced edge
                        // inside `obj`'s fields; writing it into a fresh
                        // local root (`dest`) needs its own retain, the
                        // same promotion `Copy` performs below.
                        self.values.retain(v);
                        self.frame_mut(id).set(dest, v);
                        self.advance(id)
                    }
                    _ => StepOutcome::Aborted,
                }
            }

            Instr::UnionAccess { obj, tag, dest } => {
                let obj = self.frame(id).get(*obj);
                let tag = *tag;
                let dest = *dest;
                let obj = match self.strict(obj) {
                    Some(v) => v,
                    None => return StepOutcome::Aborted,
                };
                match self.values.get(obj) {
                    ValueData::Union { tag: t, arg } if *t == tag => {
                        let v = *arg;
                        self.values.retain(v);
                        self.frame_mut(id).set(dest, v);
                        self.advance(id)
                    }
                    _ => StepOutcome::Aborted,
                }
            }

            Instr::UnionSelect { cond, jumps } => {
                let cond = self.frame(id).get(*cond);
                let cond = match self.strict(cond) {
                    Some(v) => v,
                    None => return StepOutcome::Aborted,
                };
                match self.values.get(cond) {
                    ValueData::Union { tag, .. } => {
                        let offset = jumps[*tag];
                        self.jump(id, offset)
                    }
                    _ => StepOutcome::Aborted,
                }
            }

            Instr::Jump { offset } => {
                let offset = *offset;
                self.jump(id, offset)
            }

            Instr::FuncValue { code, captures, dest } => {
                let statics: Vec<Value> = captures.iter().map(|c| self.frame(id).get(*c)).collect();
                let code = code.clone();
                let dest = *dest;
                let v = self.values.new_value(ValueData::Func(FuncValue { code, profile_base: 0, statics }));
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::Call { exit, func, args, dest } => {
                let func_v = self.frame(id).get(*func);
                let func_v = match self.strict(func_v) {
                    Some(v) => v,
                    None => return StepOutcome::Aborted,
                };
                let arg_vs: Vec<Value> = args.iter().map(|a| self.frame(id).get(*a)).collect();
                self.call(id, *exit, func_v, arg_vs, *dest)
            }

            Instr::Link { get_dest, put_dest } => {
                let link = self.values.new_value(ValueData::Link(LinkValue::default()));
                self.values.retain(link);
                let get_dest = *get_dest;
                let put_dest = *put_dest;
                self.frame_mut(id).set(get_dest, link);
                self.frame_mut(id).set(put_dest, link);
                self.advance(id)
            }

            Instr::Fork { args, dests } => {
                let raw: Vec<Value> = args.iter().map(|a| self.frame(id).get(*a)).collect();
                let mut procs = Vec::with_capacity(raw.len());
                for v in raw {
                    match self.strict(v) {
                        Some(v) => procs.push(v),
                        None => return StepOutcome::Aborted,
                    }
                }
                let dests = dests.clone();
                self.fork(id, procs, dests)
            }

            Instr::Join => self.join(id),

            Instr::Get { port, dest } => {
                let port = self.frame(id).get(*port);
                let dest = *dest;
                self.do_get(id, port, dest)
            }

            Instr::Put { port, arg, dest } => {
                let port = self.frame(id).get(*port);
                let arg = self.frame(id).get(*arg);
                let dest = *dest;
                self.do_put(id, port, arg, dest)
            }

            Instr::Copy { src, dest } => {
                let v = self.frame(id).get(*src);
                let dest = *dest;
                // `src`'s slot keeps its own root; `dest` becomes a
                // second independent root over the same value, so it
                // needs its own retain (each will be released once, on
                // its own frame's teardown).
                self.values.retain(v);
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::RefValue { dest } => {
                let dest = *dest;
                let v = self.values.new_value(ValueData::Ref(None));
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::RefDef { r#ref, value } => {
                let r = self.frame(id).get(*r#ref);
                let v = self.frame(id).get(*value);
                if r == v {
                    // A recursive binding whose own forward reference is
                    // its entire definition is vacuous (spec.md §3.4's
                    // RefDef check, mirroring types.rs's `define_var`).
                    return StepOutcome::Aborted;
                }
                *self.values.get_mut(r) = ValueData::Ref(Some(v));
                self.values.add_ref(r, v);
                self.advance(id)
            }

            Instr::Return { result } => {
                let v = self.frame(id).get(*result);
                self.do_return(id, v)
            }

            Instr::Type { ty, dest } => {
                let _ = ty;
                let dest = *dest;
                let v = self.values.new_value(ValueData::DataType { field_count: 0 });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::Release { target } => {
                let v = self.frame(id).get(*target);
                self.values.release(v);
                self.advance(id)
            }

            Instr::List { args, dest } => {
                let fields: Vec<Value> = args.iter().map(|a| self.frame(id).get(*a)).collect();
                let dest = *dest;
                let v = self.values.new_value(ValueData::Struct { fields });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }

            Instr::Literal { args, dest } => {
                let fields: Vec<Value> = args.iter().map(|a| self.frame(id).get(*a)).collect();
                let dest = *dest;
                let v = self.values.new_value(ValueData::Struct { fields });
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }
        }
    }

    fn advance(&mut self, id: ThreadId) -> StepOutcome {
        self.frame_mut(id).pc += 1;
        StepOutcome::Continue
    }

    fn jump(&mut self, id: ThreadId, offset: usize) -> StepOutcome {
        let f = self.frame_mut(id);
        f.pc += 1 + offset;
        StepOutcome::Continue
    }

    /// Follow a chain of `Ref` indirections down to the value they
    /// ultimately point at (spec.md §3.4's RefValue/RefDef: a recursive
    /// binding's own occurrences read back as a `Ref`, not the bound
    /// value directly, so every place that inspects a value's shape —
    /// struct/union access, union select, call, fork — must strip these
    /// layers first). Returns `None` for a ref that was read before its
    /// `RefDef` ran (still `Ref(None)`), which the caller aborts on.
    fn strict(&self, mut v: Value) -> Option<Value> {
        loop {
            match self.values.get(v) {
                ValueData::Ref(Some(next)) => v = *next,
                ValueData::Ref(None) => return None,
                _ => return Some(v),
            }
        }
    }

    fn call(&mut self, id: ThreadId, exit: bool, func: Value, args: Vec<Value>, dest: FrameIndex) -> StepOutcome {
        let (code, statics) = match self.values.get(func) {
            ValueData::Func(f) => (f.code.clone(), f.statics.clone()),
            _ => return StepOutcome::Aborted,
        };
        // `statics` is promoted out of the closure's own traced field into
        // the callee frame's root array, and `args` is duplicated from the
        // caller's roots into the callee's — each needs its own retain.
        for v in statics.iter().chain(args.iter()) {
            self.values.retain(*v);
        }
        let new_frame = Frame::new(code, statics, args);
        if exit {
            // Tail call: replace rather than push, so recursion never
            // grows the native call stack (spec.md §4.5's tail-call
            // protocol). The replaced frame's own `pending_call_dest`
            // carries forward untouched, since `new_frame` inherits it
            // below — the eventual `Return` still reports to whoever is
            // waiting on *this* logical call.
            let old = self.threads.get_mut(&id).unwrap().frames.pop().unwrap();
            let carried_dest = old.pending_call_dest;
            self.release_frame(old);
            let mut new_frame = new_frame;
            new_frame.pending_call_dest = carried_dest;
            self.threads.get_mut(&id).unwrap().frames.push(new_frame);
            let _ = dest;
        } else {
            let mut new_frame = new_frame;
            new_frame.pending_call_dest = Some(dest);
            self.threads.get_mut(&id).unwrap().frames.push(new_frame);
        }
        StepOutcome::Continue
    }

    fn do_return(&mut self, id: ThreadId, result: Value) -> StepOutcome {
        // One retain for the root `result` is about to become (the
        // caller's `dest` slot, or the interpreter's own final result
        // holder), taken before the dying frame's uniform release so it
        // survives regardless of how many of the frame's own locals
        // happen to alias it (each such alias was its own retained root,
        // per `Copy`/`StructAccess`, and is released normally below).
        self.values.retain(result);
        let thread = self.threads.get_mut(&id).unwrap();
        let done = thread.frames.pop().unwrap();
        let dest = done.pending_call_dest;
        self.release_frame(done);
        match thread.frames.last_mut() {
            None => StepOutcome::Finished(result),
            Some(caller) => {
                if let Some(dest) = dest {
                    caller.set(dest, result);
                }
                caller.pc += 1;
                StepOutcome::Continue
            }
        }
    }

    fn fork(&mut self, id: ThreadId, procs: Vec<Value>, dests: Vec<FrameIndex>) -> StepOutcome {
        let mut results = Vec::with_capacity(procs.len());
        let mut remaining = 0usize;
        let mut children = Vec::new();
        for (slot, proc_value) in procs.into_iter().enumerate() {
            match self.values.get(proc_value) {
                ValueData::Func(f) if f.code.arg_count == 0 => {
                    let code = f.code.clone();
                    let statics = f.statics.clone();
                    children.push((slot, code, statics));
                    remaining += 1;
                    results.push(None);
                }
                _ => {
                    // Not itself forked: passed straight through to the
                    // fork's `dests` once `Join` runs, which is a second
                    // root over a value still held by this frame's own
                    // `args` slot.
                    self.values.retain(proc_value);
                    results.push(Some(proc_value));
                }
            }
        }
        for (slot, code, statics) in children {
            // `statics` is promoted from the spawned closure's traced
            // field into the new thread's root frame, same as `call`.
            for v in &statics {
                self.values.retain(*v);
            }
            self.spawn(code, statics, Vec::new(), Some((id, slot)));
        }
        let thread = self.threads.get_mut(&id).unwrap();
        thread.fork = Some(ForkState { remaining, results, dests });
        self.advance(id)
    }

    fn join(&mut self, id: ThreadId) -> StepOutcome {
        let pending = self.threads[&id].fork.as_ref().map(|f| f.remaining).unwrap_or(0);
        if pending > 0 {
            self.threads.get_mut(&id).unwrap().blocked = Some(Blocked::Join);
            return StepOutcome::Blocked;
        }
        if let Some(fork) = self.threads.get_mut(&id).unwrap().fork.take() {
            let frame = self.frame_mut(id);
            for (dest, v) in fork.dests.into_iter().zip(fork.results.into_iter()) {
                frame.set(dest, v.expect("fork result present once remaining hits zero"));
            }
        }
        self.advance(id)
    }

    /// Dequeue the next value put to `link`, or park this thread on its
    /// waiter list if the queue is currently empty (spec.md §4.5).
    fn do_get(&mut self, id: ThreadId, link: Value, dest: FrameIndex) -> StepOutcome {
        let popped = match self.values.get(link) {
            ValueData::Link(l) => l.queue.borrow_mut().pop_front(),
            _ => return StepOutcome::Aborted,
        };
        match popped {
            Some(v) => {
                // The queue held `v` purely as a traced internal edge (no
                // refcount); promoting it to `dest`'s root needs its own
                // retain, same as `StructAccess`/`UnionAccess`.
                self.values.retain(v);
                self.frame_mut(id).set(dest, v);
                self.advance(id)
            }
            None => {
                match self.values.get(link) {
                    ValueData::Link(l) => l.waiters.borrow_mut().push_back(id),
                    _ => unreachable!("checked above"),
                }
                crate::trace!("thread {} blocked on get", id);
                self.threads.get_mut(&id).unwrap().blocked = Some(Blocked::Get { link, dest });
                StepOutcome::Blocked
            }
        }
    }

    /// Enqueue `arg` on `link` and, if a thread is already parked on a
    /// `Get` for it, hand the value straight to the oldest one (spec.md
    /// §4.5's FIFO wake-one guarantee). Never blocks.
    fn do_put(&mut self, id: ThreadId, link: Value, arg: Value, dest: FrameIndex) -> StepOutcome {
        let waiter = match self.values.get(link) {
            ValueData::Link(l) => {
                l.queue.borrow_mut().push_back(arg);
                l.waiters.borrow_mut().pop_front()
            }
            _ => return StepOutcome::Aborted,
        };
        // `arg` just became reachable as a traced edge inside the link's
        // queue, a heap object that already existed — escalate its GC
        // location the way `RefDef` does for a mutated `Ref`, rather than
        // retaining (retains are for new roots, not new internal edges).
        self.values.add_ref(link, arg);
        let unit = self.values.new_value(ValueData::Struct { fields: vec![] });
        self.frame_mut(id).set(dest, unit);
        if let Some(waiter_id) = waiter {
            self.resume_get(waiter_id, link);
        } else if let Some(&port) = self.external_ports.get(&link) {
            // No in-process waiter: offer the value straight to the host
            // (spec.md §6's Put side of the I/O callback) so an external
            // consumer sees it without having to wait for a future poll.
            let drained = match self.values.get(link) {
                ValueData::Link(l) => l.queue.borrow().front().copied(),
                _ => None,
            };
            if let Some(v) = drained {
                if self.io.poll_put(port, v) {
                    match self.values.get(link) {
                        ValueData::Link(l) => {
                            l.queue.borrow_mut().pop_front();
                        }
                        _ => unreachable!("checked above"),
                    }
                }
            }
        }
        self.advance(id)
    }

    /// Hand the value just enqueued on `link` to `waiter_id`, which is
    /// parked in `Blocked::Get` waiting for exactly this. The waiters list
    /// only ever holds a thread while its link's queue is empty, so the
    /// entry this `Put` just pushed is the one this waiter receives.
    fn resume_get(&mut self, waiter_id: ThreadId, link: Value) {
        let dest = match self.threads.get(&waiter_id).map(|t| t.blocked) {
            Some(Some(Blocked::Get { dest, .. })) => dest,
            _ => return,
        };
        let popped = match self.values.get(link) {
            ValueData::Link(l) => l.queue.borrow_mut().pop_front(),
            _ => None,
        };
        if let Some(v) = popped {
            self.values.retain(v);
            let thread = self.threads.get_mut(&waiter_id).unwrap();
            thread.blocked = None;
            let frame = thread.frames.last_mut().unwrap();
            frame.set(dest, v);
            frame.pc += 1;
            self.runnable.push_back(waiter_id);
        }
    }
}
