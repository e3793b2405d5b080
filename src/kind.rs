// Kind algebra (spec.md §3.1).
//
// Kinds are reference-counted and non-cyclic, so a plain `Rc` gives us the
// refcounting for free; no separate heap is needed for them (unlike
// Types, see type_heap.rs). Grounded on the original kind.h:
// FBLE_BASIC_KIND carries a level, FBLE_POLY_KIND carries arg/result kinds.

use crate::util::Loc;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct Kind(Rc<KindData>);

#[derive(Debug)]
enum KindData {
    Basic { level: usize, loc: Loc },
    Poly { arg: Kind, result: Kind, loc: Loc },
}

impl Kind {
    pub fn basic(level: usize, loc: Loc) -> Kind {
        Kind(Rc::new(KindData::Basic { level, loc }))
    }

    pub fn poly(arg: Kind, result: Kind, loc: Loc) -> Kind {
        Kind(Rc::new(KindData::Poly { arg, result, loc }))
    }

    pub fn loc(&self) -> &Loc {
        match &*self.0 {
            KindData::Basic { loc, .. } => loc,
            KindData::Poly { loc, .. } => loc,
        }
    }

    pub fn is_poly(&self) -> bool {
        matches!(&*self.0, KindData::Poly { .. })
    }

    pub fn arg(&self) -> Option<&Kind> {
        match &*self.0 {
            KindData::Poly { arg, .. } => Some(arg),
            KindData::Basic { .. } => None,
        }
    }

    pub fn result(&self) -> Option<&Kind> {
        match &*self.0 {
            KindData::Poly { result, .. } => Some(result),
            KindData::Basic { .. } => None,
        }
    }

    /// `level(poly) = level(result)` (spec.md §3.1).
    pub fn level(&self) -> usize {
        match &*self.0 {
            KindData::Basic { level, .. } => *level,
            KindData::Poly { result, .. } => result.level(),
        }
    }

    /// Adds `delta` to every basic kind's level, recursively.
    pub fn adjust(&self, delta: usize) -> Kind {
        match &*self.0 {
            KindData::Basic { level, loc } => Kind::basic(level + delta, loc.clone()),
            KindData::Poly { arg, result, loc } => {
                Kind::poly(arg.adjust(delta), result.adjust(delta), loc.clone())
            }
        }
    }
}

/// Structural equality, ignoring source location: two kinds describe the
/// same classification iff their shapes match.
impl PartialEq for Kind {
    fn eq(&self, other: &Kind) -> bool {
        match (&*self.0, &*other.0) {
            (KindData::Basic { level: a, .. }, KindData::Basic { level: b, .. }) => a == b,
            (
                KindData::Poly { arg: a1, result: r1, .. },
                KindData::Poly { arg: a2, result: r2, .. },
            ) => a1 == a2 && r1 == r2,
            _ => false,
        }
    }
}
impl Eq for Kind {}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            KindData::Basic { level, .. } => write!(f, "@{}", level),
            KindData::Poly { arg, result, .. } => write!(f, "<{}>{}", arg, result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loc() -> Loc {
        Loc::synthetic()
    }

    fn arb_kind() -> impl Strategy<Value = Kind> {
        let leaf = (0usize..4).prop_map(|level| Kind::basic(level, loc()));
        leaf.prop_recursive(4, 16, 4, |inner| {
            (inner.clone(), inner).prop_map(|(arg, result)| Kind::poly(arg, result, loc()))
        })
    }

    proptest! {
        #[test]
        fn eq_is_reflexive(k in arb_kind()) {
            prop_assert_eq!(k.clone(), k);
        }

        #[test]
        fn eq_is_symmetric(a in arb_kind(), b in arb_kind()) {
            prop_assert_eq!(a == b, b == a);
        }

        #[test]
        fn adjust_composes(k in arb_kind(), m in 0usize..5, n in 0usize..5) {
            prop_assert_eq!(k.adjust(m).adjust(n), k.adjust(m + n));
        }
    }

    #[test]
    fn poly_level_is_result_level() {
        let k = Kind::poly(Kind::basic(1, loc()), Kind::basic(2, loc()), loc());
        assert_eq!(k.level(), 2);
    }

    #[test]
    fn eq_is_transitive_example() {
        let a = Kind::basic(1, loc());
        let b = Kind::basic(1, loc());
        let c = Kind::basic(1, loc());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, c);
    }
}
