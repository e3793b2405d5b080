// Shared small helpers used throughout the crate.

use std::fmt;
use std::rc::Rc;

#[macro_export]
macro_rules! trace(
    ( $($thing:expr),* ) => { log::trace!($($thing),*) };
);

/// A source location, threaded through every AST/Tc/instruction node so
/// that every error in the taxonomy of spec.md §7 can be reported against
/// a concrete position. Parsing itself is out of scope for this crate
/// (see spec.md §1); `Loc` is the minimal contract we require from it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Loc {
    pub source: Rc<str>,
    pub line: usize,
    pub col: usize,
}

impl Loc {
    pub fn new(source: impl Into<Rc<str>>, line: usize, col: usize) -> Loc {
        Loc { source: source.into(), line, col }
    }

    /// A placeholder location for synthesized nodes (e.g. instructions
    /// generated by the linker that have no corresponding source text).
    pub fn synthetic() -> Loc {
        Loc { source: Rc::from("<synthetic>"), line: 0, col: 0 }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.col)
    }
}
