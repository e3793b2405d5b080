// Crate-wide error taxonomy (spec.md §7).
//
// Each component keeps its own narrow error type (TypeError in
// typecheck.rs, RuntimeError in interp.rs). FbleError unifies them for
// callers that don't care which stage failed.

use crate::typecheck::TypeError;
use crate::util::Loc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FbleError {
    #[error("{loc}: {source}")]
    TypeCheck { loc: Loc, source: TypeError },

    #[error("{loc}: unresolvable module reference {path}")]
    UnresolvedModule { loc: Loc, path: String },

    #[error("aborted at {loc}")]
    Aborted { loc: Loc },
}
