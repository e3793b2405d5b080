// Standard module linker (spec.md §4.6): composes per-module functions
// into one entry function by wiring their dependencies through locals of
// a synthesized top-level code block. Grounded on the original
// `FbleLink`, which performs exactly this dependency-sorted
// call-and-wire rather than anything resembling dynamic linking
// (spec.md §1 excludes that).

use crate::bytecode::{CodeBlock, FrameIndex, Instr};
use std::collections::HashSet;

/// One compiled module as the linker sees it: a dotted module path, the
/// paths of the modules its own function takes as arguments (in the
/// order its `Executable` expects them), and that function itself —
/// already produced by irgen.rs, living in the caller's statics array.
pub struct Module {
    pub path: Vec<String>,
    pub deps: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    UnresolvedModule { path: Vec<String> },
    Cycle { path: Vec<String> },
    Duplicate { path: Vec<String> },
}

/// Link `modules` into a single top-level code block taking zero
/// arguments and `modules.len()` statics — one per module, in the same
/// order as `modules` itself, the way `Interpreter::spawn`'s caller is
/// expected to supply the linked `FuncValue`s as that block's captures.
///
/// Dependency order is resolved by this function (spec.md §4.6 says the
/// calls are emitted "in dependency-sorted order"); `modules` itself may
/// be given in any order.
fn index_of(modules: &[Module], path: &[String]) -> Option<usize> {
    modules.iter().position(|m| m.path == path)
}

pub fn link(modules: &[Module]) -> Result<CodeBlock, LinkError> {
    let mut seen_paths = HashSet::new();
    for m in modules {
        if !seen_paths.insert(&m.path) {
            return Err(LinkError::Duplicate { path: m.path.clone() });
        }
    }
    for m in modules {
        for dep in &m.deps {
            if index_of(modules, dep).is_none() {
                return Err(LinkError::UnresolvedModule { path: dep.clone() });
            }
        }
    }

    let order = topo_sort(modules)?;

    let mut code = CodeBlock::new(0, modules.len());
    let locals: Vec<FrameIndex> = (0..modules.len()).map(|_| code.fresh_local()).collect();

    for &i in &order {
        let args: Vec<FrameIndex> = modules[i]
            .deps
            .iter()
            .map(|dep| locals[index_of(modules, dep).expect("checked above")])
            .collect();
        code.push(Instr::Call {
            exit: false,
            func: FrameIndex::static_(i),
            args,
            dest: locals[i],
        });
    }

    // The last module in dependency order holds the program's overall
    // value; every earlier module's local is released once all calls
    // that might still need it have run (spec.md §4.6).
    let &last = order.last().expect("modules is non-empty by construction below");
    for &i in &order {
        if i != last {
            code.push(Instr::Release { target: locals[i] });
        }
    }
    code.push(Instr::Return { result: locals[last] });

    Ok(code)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// A plain depth-first topological sort over the modules' declared
/// dependency edges, reporting the first cycle found.
fn topo_sort(modules: &[Module]) -> Result<Vec<usize>, LinkError> {
    let mut marks = vec![Mark::Unvisited; modules.len()];
    let mut order = Vec::with_capacity(modules.len());
    for i in 0..modules.len() {
        visit(i, modules, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn visit(i: usize, modules: &[Module], marks: &mut [Mark], order: &mut Vec<usize>) -> Result<(), LinkError> {
    match marks[i] {
        Mark::Done => return Ok(()),
        Mark::Visiting => return Err(LinkError::Cycle { path: modules[i].path.clone() }),
        Mark::Unvisited => {}
    }
    marks[i] = Mark::Visiting;
    for dep in &modules[i].deps {
        let j = index_of(modules, dep).expect("unresolved deps rejected before topo_sort runs");
        visit(j, modules, marks, order)?;
    }
    marks[i] = Mark::Done;
    order.push(i);
    Ok(())
}
