// Typed intermediate representation (spec.md §3.3): the output of type
// checking, input to bytecode lowering (irgen.rs). Each node owns its
// static type (a GC handle, retained for the node's lifetime) alongside
// the shape the original expression had.

use crate::types::{DataKind, Type};
use crate::util::Loc;
use std::rc::Rc;

pub type Tc = Rc<TcData>;

#[derive(Debug, Clone)]
pub struct TcData {
    pub ty: Type,
    pub loc: Loc,
    pub kind: TcKind,
}

#[derive(Debug, Clone)]
pub enum TcKind {
    /// A type used as a value (spec.md §3.2's `@<T>` types-as-values).
    TypeValue,

    /// Reference to a previously bound name, resolved to a frame slot at
    /// lowering time via the checker's `Env<Tc>`.
    Var(String),

    /// `let` (possibly several mutually recursive bindings at once).
    /// `recursive` mirrors spec.md §4.2's forward-Var-then-define-Var
    /// protocol: lowering must allocate `RefValue`/`RefDef` pairs for a
    /// recursive Let, plain locals otherwise.
    Let { recursive: bool, bindings: Vec<(String, Tc)>, body: Tc },

    StructValue { fields: Vec<Tc> },
    UnionValue { tag: usize, field_count: usize, arg: Tc },

    /// Field access, by position (names are resolved to positions during
    /// checking, the same way FrameIndex::Local slots are). `kind`
    /// records whether `object`'s type was a struct or a union, since
    /// the two lower to different, differently-checked instructions
    /// (spec.md §3.4's StructAccess vs. UnionAccess).
    DataAccess { object: Tc, field: usize, kind: DataKind },

    /// `union.?(tag1: e1, tag2: e2, ...)`, plus an optional default/else
    /// arm matching the wildcard case.
    UnionSelect { condition: Tc, arms: Vec<Tc> },

    FuncValue { arg_names: Vec<String>, captured: Vec<String>, body: Tc },
    FuncApply { func: Tc, args: Vec<Tc> },

    /// `T <~ get, put; body` — introduces a fresh typed link around
    /// `body`, binding its get/put ports under these names.
    Link { get_name: String, put_name: String, body: Tc },
    /// `!body` wrapping a statement sequence with `~` exec bindings
    /// (spec.md §3.3's Exec sugar over Link put/get and fork/join).
    Exec { bindings: Vec<(String, Tc)>, body: Tc },

    /// A bare reference to a link's get port, used as a process
    /// (spec.md §4.5): reading it performs the actual blocking dequeue,
    /// distinct from an ordinary `Var` read of a non-port value.
    LinkGet { name: String },
    /// Applying a link's put port to `value` (spec.md §4.5): enqueues and
    /// wakes a waiter, distinct from an ordinary function call.
    LinkPut { name: String, value: Tc },

    /// Desugared list/literal syntax (spec.md §3.3's List/Literal sugar),
    /// already lowered to nested StructValue/UnionValue construction by
    /// the time it reaches this node; kept distinct purely so error
    /// messages can still say "in this list literal".
    List { elems: Vec<Tc> },
    Literal { chars: Vec<Tc> },
}

impl TcData {
    pub fn new(ty: Type, loc: Loc, kind: TcKind) -> Tc {
        Rc::new(TcData { ty, loc, kind })
    }
}
