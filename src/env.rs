// Lexical scoping for the type checker (spec.md §4.2). A chain of scopes,
// each tracking, per function boundary, which names from an enclosing
// scope were actually looked up — the capture list a FuncValue
// instruction needs (spec.md §3.4's FuncValue captures, §4.3's lowering
// of `Tc::FuncValue`).

use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone)]
pub struct Env<T>(Rc<Scope<T>>);

struct Scope<T> {
    /// Insertion-ordered so captures and statics are indexed
    /// deterministically the way FrameIndex::Static expects (spec.md
    /// §3.4), without a separate order-tracking Vec.
    vars: RefCell<IndexMap<String, T>>,
    parent: Option<Env<T>>,
    /// `Some` at a function boundary: names resolved through this scope
    /// from a nested scope are recorded here, in first-use order.
    captures: Option<RefCell<IndexSet<String>>>,
}

impl<T: Clone> Env<T> {
    pub fn root() -> Env<T> {
        Env(Rc::new(Scope { vars: RefCell::new(IndexMap::new()), parent: None, captures: None }))
    }

    /// A nested block scope: lookups pass straight through to `parent`
    /// without being recorded as captures.
    pub fn chain(parent: &Env<T>) -> Env<T> {
        Env(Rc::new(Scope {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(parent.clone()),
            captures: None,
        }))
    }

    /// A function-body scope: any name resolved from `parent` (or
    /// further out) is recorded as a capture of this function.
    pub fn function(parent: &Env<T>) -> Env<T> {
        Env(Rc::new(Scope {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(parent.clone()),
            captures: Some(RefCell::new(IndexSet::new())),
        }))
    }

    pub fn define(&self, name: impl Into<String>, value: T) {
        self.0.vars.borrow_mut().insert(name.into(), value);
    }

    /// Look up `name`, searching outward through the scope chain. Crossing
    /// a function boundary that doesn't already have it bound locally
    /// records it as a capture of that function (once).
    pub fn get(&self, name: &str) -> Option<T> {
        if let Some(v) = self.0.vars.borrow().get(name) {
            return Some(v.clone());
        }
        let parent = self.0.parent.as_ref()?;
        let value = parent.get(name)?;
        if let Some(captures) = &self.0.captures {
            captures.borrow_mut().insert(name.to_string());
        }
        Some(value)
    }

    /// Like `get`, but never records a capture — for contexts that merely
    /// need to know a name resolves (e.g. checking a type expression that
    /// mentions a value variable) without counting it as a real use
    /// (spec.md §4.2's `check_expr_for_type` shadow-scope rule).
    pub fn peek(&self, name: &str) -> Option<T> {
        if let Some(v) = self.0.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.0.parent.as_ref()?.peek(name)
    }

    /// Names bound directly in this scope, in definition order (used to
    /// compute `FrameIndex::Local` slots).
    pub fn locals(&self) -> Vec<String> {
        self.0.vars.borrow().keys().cloned().collect()
    }

    /// Names captured from an enclosing scope across this function's
    /// boundary, in first-use order — `None` for non-function scopes.
    pub fn captures(&self) -> Option<Vec<String>> {
        self.0.captures.as_ref().map(|c| c.borrow().iter().cloned().collect())
    }
}
