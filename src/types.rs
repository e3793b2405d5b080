// Type algebra and normalisation (spec.md §3.2, §4.2's normalisation
// rules). Types are GC-managed via `TypeHeap` (built on heap.rs's generic
// incremental collector); a `Type` value is a lightweight, `Copy` handle
// into that heap — callers are responsible for `retain`/`release`, an
// explicit heap-plus-add-ref discipline rather than an `Rc`-style
// automatic refcount, since type graphs can be cyclic through `Var`.

use crate::heap::{Handle, Heap, HeapObject, RawId};
use crate::kind::Kind;
use crate::util::Loc;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataKind {
    Struct,
    Union,
}

pub type Type = Handle<TypeData>;

#[derive(Debug)]
pub enum TypeData {
    Data { kind: DataKind, fields: Vec<(String, Type)> },
    Func { args: Vec<Type>, result: Type },
    Proc { elem: Type },
    /// `∀var. body`. `var` must itself be a `Var`-tagged Type.
    Poly { var: Type, body: Type },
    PolyApply { poly: Type, arg: Type },
    Var { kind: Kind, name: String, value: Option<Type>, abstract_: bool, loc: Loc },
    /// `@<inner>` — the type of a type.
    TypeOf { inner: Type },
    /// Module-scoped opacity (spec.md §3.2, optional per spec.md §9).
    Abstract { path: Vec<String>, payload: Type },
}

impl HeapObject for TypeData {
    fn visit_refs(&self, visit: &mut dyn FnMut(RawId)) {
        match self {
            TypeData::Data { fields, .. } => {
                for (_, t) in fields {
                    visit(t.index);
                }
            }
            TypeData::Func { args, result } => {
                for a in args {
                    visit(a.index);
                }
                visit(result.index);
            }
            TypeData::Proc { elem } => visit(elem.index),
            TypeData::Poly { var, body } => {
                visit(var.index);
                visit(body.index);
            }
            TypeData::PolyApply { poly, arg } => {
                visit(poly.index);
                visit(arg.index);
            }
            TypeData::Var { value, .. } => {
                if let Some(v) = value {
                    visit(v.index);
                }
            }
            TypeData::TypeOf { inner } => visit(inner.index),
            TypeData::Abstract { payload, .. } => visit(payload.index),
        }
    }
}

pub struct TypeHeap {
    heap: Heap<TypeData>,
}

impl TypeHeap {
    /// Unlike `ValueHeap`, there's no host-facing `Config` knob for the
    /// type checker's own heap — type graphs built while checking a
    /// single module stay small, so it runs with no generation cap.
    pub fn new() -> TypeHeap {
        TypeHeap { heap: Heap::new(usize::MAX) }
    }

    /// Allocate a type node, establishing add-ref edges to every child it
    /// refers to (spec.md §4.1's Add-ref) so the GC can track the new
    /// cross-reference.
    pub fn new_type(&mut self, data: TypeData) -> Type {
        let handle = self.heap.allocate(data, &mut |_| {});
        let mut children = Vec::new();
        self.heap.get(handle).visit_refs(&mut |id| children.push(id));
        for child_raw in children {
            let child = self.heap.raw_to_handle(child_raw);
            self.heap.add_ref(handle, child);
        }
        handle
    }

    /// Allocate a fresh, unbound `Var` — used both for poly binders and
    /// for the forward-reference trick that closes recursive `let`
    /// bindings (spec.md §4.2's Let rule).
    pub fn new_var(&mut self, kind: Kind, name: impl Into<String>, abstract_: bool, loc: Loc) -> Type {
        self.new_type(TypeData::Var { kind, name: name.into(), value: None, abstract_, loc })
    }

    /// Back-patch a `Var`'s definition (closing a recursive binding).
    /// Returns `false` ("vacuous") if `value` is itself nothing but an
    /// indirection back to `var`, per spec.md §4.2's vacuous-binding rule.
    pub fn define_var(&mut self, var: Type, value: Type) -> bool {
        self.heap.add_ref(var, value);
        match self.heap.get_mut(var) {
            TypeData::Var { value: slot, .. } => *slot = Some(value),
            _ => panic!("define_var on a non-Var type"),
        }
        // A binding is vacuous if, once in place, the var normalises to
        // nothing but an unbroken chain of Var indirection back to
        // itself — no structural node ever breaks the cycle.
        if self.normalise(var).is_some() {
            true
        } else {
            match self.heap.get_mut(var) {
                TypeData::Var { value: slot, .. } => *slot = None,
                _ => unreachable!(),
            }
            false
        }
    }

    pub fn get(&self, t: Type) -> &TypeData {
        self.heap.get(t)
    }

    pub fn retain(&mut self, t: Type) {
        self.heap.retain(t);
    }

    pub fn release(&mut self, t: Type) {
        self.heap.release(t, &mut |_| {});
    }

    pub fn full_gc(&mut self) {
        self.heap.full_gc(&mut |_| {});
    }

    pub fn live_count(&self) -> usize {
        self.heap.live_count()
    }

    /// Normalise a type per spec.md §4.2:
    /// - eta-reduces `PolyApply(Poly(a, body), a) -> body` when `a` isn't
    ///   free elsewhere (approximated here as: body applied back to its
    ///   own binder),
    /// - beta-reduces `PolyApply(Poly(a, body), arg) -> body[a := arg]`,
    /// - unfolds `Var` indirections,
    /// - returns `None` if the type is vacuous (an unbroken cycle of
    ///   `Var` indirection with no structural node).
    pub fn normalise(&mut self, t: Type) -> Option<Type> {
        let mut seen = Vec::new();
        self.normalise_inner(t, &mut seen)
    }

    fn normalise_inner(&mut self, t: Type, seen: &mut Vec<Type>) -> Option<Type> {
        match self.heap.get(t) {
            TypeData::Var { value: Some(v), .. } => {
                let v = *v;
                if seen.contains(&t) {
                    return None;
                }
                seen.push(t);
                self.normalise_inner(v, seen)
            }
            TypeData::Var { value: None, .. } => Some(t),
            TypeData::PolyApply { poly, arg } => {
                let (poly, arg) = (*poly, *arg);
                let poly_n = self.normalise_inner(poly, seen)?;
                match self.heap.get(poly_n) {
                    TypeData::Poly { var, body } => {
                        let (var, body) = (*var, *body);
                        let substituted = self.substitute(body, var, arg);
                        self.normalise_inner(substituted, seen)
                    }
                    _ => Some(t),
                }
            }
            _ => Some(t),
        }
    }

    /// Structural, capture-avoiding-by-construction substitution
    /// `body[var := arg]`. Because `Var` nodes are unique heap objects
    /// (never interned), substitution never needs alpha-renaming: nodes
    /// that don't transitively mention `var` are shared unchanged; nodes
    /// that do are rebuilt with the substitution applied to their
    /// children, mirroring spec.md §4.2's "memo of original-var ->
    /// substituted-var" (here the memo is just the recursion itself,
    /// since each node is visited at most once per substitution).
    fn substitute(&mut self, body: Type, var: Type, arg: Type) -> Type {
        if body == var {
            return arg;
        }
        if !self.mentions(body, var, &mut Vec::new()) {
            return body;
        }
        let data = match self.heap.get(body) {
            TypeData::Data { kind, fields } => {
                let kind = *kind;
                let fields = fields.clone();
                let fields = fields
                    .into_iter()
                    .map(|(n, t)| (n, self.substitute(t, var, arg)))
                    .collect();
                TypeData::Data { kind, fields }
            }
            TypeData::Func { args, result } => {
                let args = args.clone();
                let result = *result;
                let args = args.into_iter().map(|a| self.substitute(a, var, arg)).collect();
                let result = self.substitute(result, var, arg);
                TypeData::Func { args, result }
            }
            TypeData::Proc { elem } => {
                let elem = self.substitute(*elem, var, arg);
                TypeData::Proc { elem }
            }
            TypeData::Poly { var: pvar, body: pbody } => {
                let (pvar, pbody) = (*pvar, *pbody);
                TypeData::Poly { var: pvar, body: self.substitute(pbody, var, arg) }
            }
            TypeData::PolyApply { poly, arg: a } => {
                let (poly, a) = (*poly, *a);
                TypeData::PolyApply {
                    poly: self.substitute(poly, var, arg),
                    arg: self.substitute(a, var, arg),
                }
            }
            TypeData::Var { value: Some(v), kind, name, abstract_, loc } => {
                let (v, kind, name, abstract_, loc) =
                    (*v, kind.clone(), name.clone(), *abstract_, loc.clone());
                TypeData::Var { kind, name, value: Some(self.substitute(v, var, arg)), abstract_, loc }
            }
            TypeData::Var { value: None, .. } => return body,
            TypeData::TypeOf { inner } => {
                let inner = self.substitute(*inner, var, arg);
                TypeData::TypeOf { inner }
            }
            TypeData::Abstract { path, payload } => {
                let path = path.clone();
                let payload = self.substitute(*payload, var, arg);
                TypeData::Abstract { path, payload }
            }
        };
        self.new_type(data)
    }

    fn mentions(&self, t: Type, var: Type, seen: &mut Vec<Type>) -> bool {
        if t == var {
            return true;
        }
        if seen.contains(&t) {
            return false;
        }
        seen.push(t);
        let mut found = false;
        match self.heap.get(t) {
            TypeData::Data { fields, .. } => {
                for (_, f) in fields {
                    found |= self.mentions(*f, var, seen);
                }
            }
            TypeData::Func { args, result } => {
                for a in args {
                    found |= self.mentions(*a, var, seen);
                }
                found |= self.mentions(*result, var, seen);
            }
            TypeData::Proc { elem } => found |= self.mentions(*elem, var, seen),
            TypeData::Poly { body, .. } => found |= self.mentions(*body, var, seen),
            TypeData::PolyApply { poly, arg } => {
                found |= self.mentions(*poly, var, seen);
                found |= self.mentions(*arg, var, seen);
            }
            TypeData::Var { value: Some(v), .. } => found |= self.mentions(*v, var, seen),
            TypeData::Var { value: None, .. } => {}
            TypeData::TypeOf { inner } => found |= self.mentions(*inner, var, seen),
            TypeData::Abstract { payload, .. } => found |= self.mentions(*payload, var, seen),
        }
        found
    }

    /// `types_equal(vars, a, b)` of spec.md §4.2: normalises both sides,
    /// then compares structurally, unifying any of `vars` encountered on
    /// the left against whatever the right normalises to.
    pub fn types_equal(&mut self, vars: &mut HashMap<Type, Type>, a: Type, b: Type) -> bool {
        let (Some(a), Some(b)) = (self.normalise(a), self.normalise(b)) else {
            return false;
        };
        if let Some(&assigned) = vars.get(&a) {
            return self.types_equal(vars, assigned, b);
        }

        // Clone out just enough of each side's shape to release the borrow
        // on `self.heap` before recursing (recursive calls need `&mut
        // self`); `Type` handles are `Copy`, so this is cheap.
        enum Shape {
            Data(DataKind, Vec<(String, Type)>),
            Func(Vec<Type>, Type),
            Proc(Type),
            Poly(Type, Type),
            PolyApply(Type, Type),
            Var,
            TypeOf(Type),
            Abstract(Vec<String>, Type),
        }
        fn shape_of(data: &TypeData) -> Shape {
            match data {
                TypeData::Data { kind, fields } => Shape::Data(*kind, fields.clone()),
                TypeData::Func { args, result } => Shape::Func(args.clone(), *result),
                TypeData::Proc { elem } => Shape::Proc(*elem),
                TypeData::Poly { var, body } => Shape::Poly(*var, *body),
                TypeData::PolyApply { poly, arg } => Shape::PolyApply(*poly, *arg),
                TypeData::Var { .. } => Shape::Var,
                TypeData::TypeOf { inner } => Shape::TypeOf(*inner),
                TypeData::Abstract { path, payload } => Shape::Abstract(path.clone(), *payload),
            }
        }
        let sa = shape_of(self.heap.get(a));
        let sb = shape_of(self.heap.get(b));

        match (sa, sb) {
            (Shape::Data(k1, f1), Shape::Data(k2, f2)) => {
                k1 == k2
                    && f1.len() == f2.len()
                    && f1.into_iter().zip(f2.into_iter()).all(|((n1, t1), (n2, t2))| {
                        n1 == n2 && self.types_equal(vars, t1, t2)
                    })
            }
            (Shape::Func(a1, r1), Shape::Func(a2, r2)) => {
                a1.len() == a2.len()
                    && a1.into_iter().zip(a2.into_iter()).all(|(x, y)| self.types_equal(vars, x, y))
                    && self.types_equal(vars, r1, r2)
            }
            (Shape::Proc(e1), Shape::Proc(e2)) => self.types_equal(vars, e1, e2),
            (Shape::Poly(v1, b1), Shape::Poly(v2, b2)) => {
                vars.insert(v2, v1);
                self.types_equal(vars, b1, b2)
            }
            (Shape::PolyApply(p1, a1), Shape::PolyApply(p2, a2)) => {
                self.types_equal(vars, p1, p2) && self.types_equal(vars, a1, a2)
            }
            (Shape::Var, Shape::Var) => a == b,
            (Shape::TypeOf(i1), Shape::TypeOf(i2)) => self.types_equal(vars, i1, i2),
            (Shape::Abstract(p1, pl1), Shape::Abstract(p2, pl2)) => {
                p1 == p2 && self.types_equal(vars, pl1, pl2)
            }
            _ => false,
        }
    }
}

impl Default for TypeHeap {
    fn default() -> Self {
        TypeHeap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Loc {
        Loc::synthetic()
    }

    #[test]
    fn unit_equals_itself() {
        let mut h = TypeHeap::new();
        let unit = h.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] });
        let mut vars = HashMap::new();
        assert!(h.types_equal(&mut vars, unit, unit));
    }

    #[test]
    fn normalise_is_idempotent_on_concrete_types() {
        let mut h = TypeHeap::new();
        let unit = h.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] });
        let proc = h.new_type(TypeData::Proc { elem: unit });
        let once = h.normalise(proc).unwrap();
        let twice = h.normalise(once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn var_indirection_unfolds() {
        let mut h = TypeHeap::new();
        let unit = h.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] });
        let v = h.new_var(Kind::basic(1, loc()), "X", false, loc());
        assert!(h.define_var(v, unit));
        let n = h.normalise(v).unwrap();
        assert_eq!(n, unit);
    }

    #[test]
    fn self_cycle_is_vacuous() {
        let mut h = TypeHeap::new();
        let v = h.new_var(Kind::basic(1, loc()), "X", false, loc());
        // Defining `X := X` (no structural node breaks the cycle) must be
        // rejected as vacuous.
        assert!(!h.define_var(v, v));
    }

    use proptest::prelude::*;

    /// A recipe for a concrete (Var-free) type tree, built fresh against a
    /// scratch heap inside each proptest case — `Type` itself is a heap
    /// handle and can't be generated without one.
    #[derive(Clone, Debug)]
    enum Shape {
        Unit,
        Struct(Vec<Shape>),
        Func(Vec<Shape>, Box<Shape>),
    }

    fn arb_shape() -> impl Strategy<Value = Shape> {
        let leaf = Just(Shape::Unit);
        leaf.prop_recursive(3, 12, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Shape::Struct),
                (prop::collection::vec(inner.clone(), 0..2), inner)
                    .prop_map(|(args, r)| Shape::Func(args, Box::new(r))),
            ]
        })
    }

    fn build(h: &mut TypeHeap, shape: &Shape) -> Type {
        match shape {
            Shape::Unit => h.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] }),
            Shape::Struct(fields) => {
                let fields =
                    fields.iter().enumerate().map(|(i, f)| (format!("f{}", i), build(h, f))).collect();
                h.new_type(TypeData::Data { kind: DataKind::Struct, fields })
            }
            Shape::Func(args, result) => {
                let args = args.iter().map(|a| build(h, a)).collect();
                let result = build(h, result);
                h.new_type(TypeData::Func { args, result })
            }
        }
    }

    proptest! {
        #[test]
        fn type_equality_is_reflexive(shape in arb_shape()) {
            let mut h = TypeHeap::new();
            let t = build(&mut h, &shape);
            let mut vars = HashMap::new();
            prop_assert!(h.types_equal(&mut vars, t, t));
        }

        #[test]
        fn type_equality_is_symmetric(a in arb_shape(), b in arb_shape()) {
            let mut h = TypeHeap::new();
            let ta = build(&mut h, &a);
            let tb = build(&mut h, &b);
            let mut vars_ab = HashMap::new();
            let mut vars_ba = HashMap::new();
            prop_assert_eq!(h.types_equal(&mut vars_ab, ta, tb), h.types_equal(&mut vars_ba, tb, ta));
        }

        #[test]
        fn substitution_is_a_no_op_when_the_var_is_not_free(shape in arb_shape()) {
            let mut h = TypeHeap::new();
            let t = build(&mut h, &shape);
            let unrelated = h.new_var(Kind::basic(0, loc()), "unused", false, loc());
            let replacement = h.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] });
            let result = h.substitute(t, unrelated, replacement);
            prop_assert_eq!(result, t);
        }
    }
}
