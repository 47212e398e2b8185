//! Compact subject tags rendered from recipient expressions.

use crate::set::expr::{Expr, Node};
use crate::set::universe::Universe;

/// Renders the tag text for an expression, without the surrounding
/// brackets.
///
/// Leaves render as the configured list symbol when one exists and as the
/// identifier verbatim otherwise. Operators render as `|`, `&`, `-`. A
/// subexpression is parenthesized exactly when the sender braced it, so the
/// tag reproduces the address's grouping rather than a minimized form.
pub fn render(expr: &Expr, universe: &Universe) -> String {
    let body = match &expr.node {
        Node::Ref(name) => universe
            .symbol(name)
            .map(str::to_owned)
            .unwrap_or_else(|| name.clone()),
        Node::Union(a, b) => format!("{}|{}", render(a, universe), render(b, universe)),
        Node::Inter(a, b) => format!("{}&{}", render(a, universe), render(b, universe)),
        Node::Diff(a, b) => format!("{}-{}", render(a, universe), render(b, universe)),
    };
    if expr.braced {
        format!("({body})")
    } else {
        body
    }
}
