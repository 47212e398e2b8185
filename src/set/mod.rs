//! The set pipeline: recipient parsing, resolution, evaluation, tagging.

pub mod eval;
pub mod expr;
pub mod parser;
pub mod tag;
pub mod universe;

pub use expr::{Expr, Node, SetOp};
pub use parser::{parse, ParseError, ParseErrorKind};
pub use universe::{Member, ResolveError, Universe, UniverseError};

use std::collections::BTreeSet;

use thiserror::Error;

/// Why a `RCPT TO` address was rejected.
///
/// The rendered forms are the texts of the 550 replies, which the upstream
/// MTA turns into the bounce the sender sees.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecipientError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("incorrect domain: {0}")]
    WrongDomain(String),

    #[error("empty set: no recipients match this expression")]
    EmptySet,
}

/// A validated recipient expression, ready for relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipient {
    /// The local part exactly as it appeared in `RCPT TO`.
    pub local_part: String,
    /// Subject tag for this expression, without the surrounding brackets.
    pub tag: String,
    /// Canonical addresses the expression evaluated to. Never empty.
    pub addresses: BTreeSet<String>,
}

/// Runs the full pipeline for one `RCPT TO` address: domain check, parse,
/// evaluate, reject empty results, render the tag.
pub fn resolve_recipient(
    addr: &str,
    universe: &Universe,
    incoming_domain: &str,
) -> Result<ResolvedRecipient, RecipientError> {
    let (local_part, domain) = addr.split_once('@').unwrap_or((addr, ""));
    if !domain.eq_ignore_ascii_case(incoming_domain) {
        return Err(RecipientError::WrongDomain(domain.to_string()));
    }

    let expr = parser::parse(local_part)?;
    let addresses = eval::eval(&expr, universe)?;
    if addresses.is_empty() {
        return Err(RecipientError::EmptySet);
    }

    Ok(ResolvedRecipient {
        local_part: local_part.to_string(),
        tag: tag::render(&expr, universe),
        addresses,
    })
}
