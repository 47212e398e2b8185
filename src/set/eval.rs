//! Set evaluation of parsed recipient expressions.

use std::collections::BTreeSet;

use crate::set::expr::{Expr, Node};
use crate::set::universe::{ResolveError, Universe};

/// Evaluates an expression to its set of canonical addresses.
///
/// Resolution errors propagate unchanged. An empty result is not an error
/// here; the caller decides what a final empty set means.
pub fn eval(expr: &Expr, universe: &Universe) -> Result<BTreeSet<String>, ResolveError> {
    match &expr.node {
        Node::Ref(name) => universe.resolve(name),
        Node::Union(a, b) => Ok(&eval(a, universe)? | &eval(b, universe)?),
        Node::Inter(a, b) => Ok(&eval(a, universe)? & &eval(b, universe)?),
        Node::Diff(a, b) => Ok(&eval(a, universe)? - &eval(b, universe)?),
    }
}
