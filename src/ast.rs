// Surface syntax (spec.md §3.3 names the typed IR it checks down to;
// this module is the untyped tree the checker walks to produce it).
// Parsing itself is out of scope (spec.md §1's Non-goals) — callers
// build `Expr`/`TypeExpr` trees directly, the way an embedder or a test
// fixture would.

use crate::util::Loc;
use std::rc::Rc;

pub type Expr = Rc<ExprData>;
pub type TypeExpr = Rc<TypeExprData>;

#[derive(Debug, Clone)]
pub struct ExprData {
    pub loc: Loc,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A value or type variable reference; which namespace it resolves
    /// in is determined by the referenced binding's kind level (spec.md
    /// §4.2's Var rule), not by surface syntax.
    Var(String),

    TypeValue(TypeExpr),

    Let { recursive: bool, bindings: Vec<LetBinding>, body: Expr },

    /// Struct value with an implicit (synthesised) type.
    StructValue(Vec<(String, Expr)>),
    /// `T:tag(e)` — `ty` names the union type, `tag` the variant.
    UnionValue { ty: TypeExpr, tag: String, arg: Expr },

    DataAccess { obj: Expr, field: String },

    UnionSelect { condition: Expr, arms: Vec<(String, Expr)>, default: Option<Expr> },

    FuncValue { args: Vec<(String, TypeExpr)>, body: Expr },
    FuncApply { func: Expr, args: Vec<Expr> },

    /// `$(e)` — eval a process.
    Eval(Expr),
    /// `T <~ get, put; body`
    Link { ty: TypeExpr, get: String, put: String, body: Expr },
    /// `T1 name1 := p1, ...; body`
    Exec { bindings: Vec<(String, TypeExpr, Expr)>, body: Expr },

    PolyValue { arg: String, arg_kind_level: usize, body: Expr },
    PolyApply { poly: Expr, arg: TypeExpr },

    List(Vec<Expr>),
    Literal(String),
}

#[derive(Debug, Clone)]
pub struct LetBinding {
    pub name: String,
    pub loc: Loc,
    pub kind_level: Option<usize>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct TypeExprData {
    pub loc: Loc,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    Var(String),
    Struct(Vec<(String, TypeExpr)>),
    Union(Vec<(String, TypeExpr)>),
    Func { args: Vec<TypeExpr>, result: TypeExpr },
    Proc(TypeExpr),
    Poly { arg: String, arg_kind_level: usize, body: TypeExpr },
    PolyApply { poly: TypeExpr, arg: TypeExpr },
    TypeOf(Expr),
}

impl ExprData {
    pub fn new(loc: Loc, kind: ExprKind) -> Expr {
        Rc::new(ExprData { loc, kind })
    }
}

impl TypeExprData {
    pub fn new(loc: Loc, kind: TypeExprKind) -> TypeExpr {
        Rc::new(TypeExprData { loc, kind })
    }
}
