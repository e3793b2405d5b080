// IR generation (spec.md §4.3): lowers a `Tc` tree to a `CodeBlock` of
// bytecode. Syntax-directed, one `CodeBlock` per `FuncValue`. Frame
// position assignment (which local/static slot a name lives in) is
// owned entirely by this pass's own `Env<FrameIndex>`, decoupled from
// the checker's `Env<Binding>` (see typecheck.rs's module comment).

use crate::bytecode::{CodeBlock, FrameIndex, Instr};
use crate::env::Env;
use crate::tc::{Tc, TcKind};
use crate::types::DataKind;
use std::rc::Rc;

pub struct IrGen {
    code: CodeBlock,
}

impl IrGen {
    /// Lower a top-level (or nested function) body. `args` names the
    /// function's own parameters, in order; `scope` resolves names free
    /// in `body` to the enclosing function's captured statics.
    pub fn lower_function(args: &[String], scope: &Env<FrameIndex>, body: &Tc) -> Rc<CodeBlock> {
        let static_count = scope_static_count(scope);
        let mut gen = IrGen { code: CodeBlock::new(args.len(), static_count) };
        let fn_scope = Env::chain(scope);
        for (i, name) in args.iter().enumerate() {
            fn_scope.define(name.clone(), FrameIndex::local(i));
        }
        gen.code.local_count = gen.code.local_count.max(args.len());
        let result = gen.lower(&fn_scope, body, true);
        gen.code.push(Instr::Return { result });
        Rc::new(gen.code)
    }

    /// Lower `tc` into the current code block, returning the frame slot
    /// holding its result. `tail` marks whether `tc`, if itself a call,
    /// should be emitted as a tail call (spec.md §4.3's last bullet).
    fn lower(&mut self, scope: &Env<FrameIndex>, tc: &Tc, tail: bool) -> FrameIndex {
        match &tc.kind {
            TcKind::TypeValue => {
                let dest = self.code.fresh_local();
                self.code.push(Instr::Type { ty: tc.ty, dest });
                dest
            }

            TcKind::Var(name) => {
                let src = scope.get(name).expect("checked var resolves");
                let dest = self.code.fresh_local();
                self.code.push(Instr::Copy { src, dest });
                dest
            }

            TcKind::Let { recursive, bindings, body } => {
                self.lower_let(scope, *recursive, bindings, body, tail)
            }

            TcKind::StructValue { fields } => {
                let args = fields.iter().map(|f| self.lower(scope, f, false)).collect();
                let dest = self.code.fresh_local();
                self.code.push(Instr::StructValue { args, dest });
                dest
            }

            TcKind::UnionValue { tag, arg, .. } => {
                let arg = self.lower(scope, arg, false);
                let dest = self.code.fresh_local();
                self.code.push(Instr::UnionValue { tag: *tag, arg, dest });
                dest
            }

            TcKind::DataAccess { object, field, kind } => {
                let obj = self.lower(scope, object, false);
                let dest = self.code.fresh_local();
                let instr = match kind {
                    DataKind::Struct => Instr::StructAccess { obj, tag: *field, dest },
                    DataKind::Union => Instr::UnionAccess { obj, tag: *field, dest },
                };
                self.code.push(instr);
                dest
            }

            TcKind::UnionSelect { condition, arms } => self.lower_union_select(scope, condition, arms, tail),

            TcKind::FuncValue { arg_names, captured, body } => {
                let capture_slots: Vec<FrameIndex> =
                    captured.iter().map(|n| scope.get(n).expect("capture resolves")).collect();
                let inner_statics = Env::root();
                for (i, name) in captured.iter().enumerate() {
                    inner_statics.define(name.clone(), FrameIndex::static_(i));
                }
                let code = IrGen::lower_function(arg_names, &inner_statics, body);
                let dest = self.code.fresh_local();
                self.code.push(Instr::FuncValue { code, captures: capture_slots, dest });
                dest
            }

            TcKind::FuncApply { func, args } => {
                let func_slot = self.lower(scope, func, false);
                let arg_slots = args.iter().map(|a| self.lower(scope, a, false)).collect();
                let dest = self.code.fresh_local();
                self.code.push(Instr::Call { exit: tail, func: func_slot, args: arg_slots, dest });
                dest
            }

            TcKind::Link { get_name, put_name, body } => {
                let get_dest = self.code.fresh_local();
                let put_dest = self.code.fresh_local();
                self.code.push(Instr::Link { get_dest, put_dest });
                let inner = Env::chain(scope);
                inner.define(get_name.clone(), get_dest);
                inner.define(put_name.clone(), put_dest);
                self.lower(&inner, body, tail)
            }

            TcKind::Exec { bindings, body } => {
                // Each binding's process result is computed in program
                // order within this frame; genuine concurrent forking of
                // Exec bindings (spec.md §4.5's Fork/Join) is reserved for
                // processes that explicitly fork (see Instr::Fork), which
                // this lowering does not need to reach for.
                let inner = Env::chain(scope);
                for (name, proc_tc) in bindings {
                    let v = self.lower(&inner, proc_tc, false);
                    inner.define(name.clone(), v);
                }
                self.lower(&inner, body, tail)
            }

            TcKind::List { elems } => {
                let args = elems.iter().map(|e| self.lower(scope, e, false)).collect();
                let dest = self.code.fresh_local();
                self.code.push(Instr::List { args, dest });
                dest
            }

            TcKind::LinkGet { name } => {
                let port = scope.get(name).expect("checked get-port resolves");
                let dest = self.code.fresh_local();
                self.code.push(Instr::Get { port, dest });
                dest
            }

            TcKind::LinkPut { name, value } => {
                let port = scope.get(name).expect("checked put-port resolves");
                let arg = self.lower(scope, value, false);
                let dest = self.code.fresh_local();
                self.code.push(Instr::Put { port, arg, dest });
                dest
            }

            TcKind::Literal { chars } => {
                let args = chars.iter().map(|c| self.lower(scope, c, false)).collect();
                let dest = self.code.fresh_local();
                self.code.push(Instr::Literal { args, dest });
                dest
            }
        }
    }

    fn lower_let(
        &mut self,
        scope: &Env<FrameIndex>,
        recursive: bool,
        bindings: &[(String, Tc)],
        body: &Tc,
        tail: bool,
    ) -> FrameIndex {
        let inner = Env::chain(scope);
        if recursive {
            let mut refs = Vec::with_capacity(bindings.len());
            for (name, _) in bindings {
                let r = self.code.fresh_local();
                self.code.push(Instr::RefValue { dest: r });
                inner.define(name.clone(), r);
                refs.push(r);
            }
            for ((_, value), r) in bindings.iter().zip(refs.iter()) {
                let v = self.lower(&inner, value, false);
                self.code.push(Instr::RefDef { r#ref: *r, value: v });
            }
        } else {
            for (name, value) in bindings {
                let v = self.lower(&inner, value, false);
                inner.define(name.clone(), v);
            }
        }
        self.lower(&inner, body, tail)
    }

    fn lower_union_select(
        &mut self,
        scope: &Env<FrameIndex>,
        condition: &Tc,
        arms: &[Tc],
        tail: bool,
    ) -> FrameIndex {
        let cond = self.lower(scope, condition, false);
        let select_at = self.code.push(Instr::UnionSelect { cond, jumps: vec![0; arms.len()] });
        let result = self.code.fresh_local();
        let mut jump_patches = Vec::with_capacity(arms.len());

        for (i, arm) in arms.iter().enumerate() {
            let branch_start = self.code.instrs.len();
            self.code.patch_jump(select_at, i, branch_start);
            let value = self.lower(scope, arm, tail);
            self.code.push(Instr::Copy { src: value, dest: result });
            if i + 1 < arms.len() {
                let jump_at = self.code.push(Instr::Jump { offset: 0 });
                jump_patches.push(jump_at);
            }
        }
        let join = self.code.instrs.len();
        for jump_at in jump_patches {
            self.code.patch_jump(jump_at, 0, join);
        }
        result
    }
}

fn scope_static_count(scope: &Env<FrameIndex>) -> usize {
    scope.locals().len()
}
