//! Expression trees for set-algebraic recipient addresses.

/// A binary set operator appearing in a recipient expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// `_|_`
    Union,
    /// `_&_`
    Inter,
    /// `_-_`
    Diff,
}

impl SetOp {
    /// Single-character form used in subject tags.
    pub fn symbol(self) -> char {
        match self {
            SetOp::Union => '|',
            SetOp::Inter => '&',
            SetOp::Diff => '-',
        }
    }
}

/// One node of a parsed recipient expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A mailing list name or individual identifier, verbatim from the
    /// address. Lowercased only at resolution time.
    Ref(String),
    Union(Box<Expr>, Box<Expr>),
    Inter(Box<Expr>, Box<Expr>),
    Diff(Box<Expr>, Box<Expr>),
}

/// A parsed expression.
///
/// `braced` records whether the node was enclosed in `{...}` in the source
/// address. Evaluation ignores it; the subject tagger uses it to reproduce
/// the sender's grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub node: Node,
    pub braced: bool,
}

impl Expr {
    /// A leaf referencing a list or individual by name.
    pub fn leaf(name: &str) -> Self {
        Expr {
            node: Node::Ref(name.to_string()),
            braced: false,
        }
    }

    /// Combines two expressions under a binary operator.
    pub fn binary(op: SetOp, left: Expr, right: Expr) -> Self {
        let (left, right) = (Box::new(left), Box::new(right));
        let node = match op {
            SetOp::Union => Node::Union(left, right),
            SetOp::Inter => Node::Inter(left, right),
            SetOp::Diff => Node::Diff(left, right),
        };
        Expr {
            node,
            braced: false,
        }
    }
}
