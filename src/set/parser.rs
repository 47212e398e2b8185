//! Parser for the local-part grammar of recipient addresses.
//!
//! A recipient local part is an expression in which leaves are mailing list
//! names or individual identifiers and the infix operators are `_|_` for set
//! union, `_&_` for set intersection, and `_-_` for set difference. Curly
//! braces `{ }` group subexpressions, and grouping is REQUIRED when more
//! than one kind of operator appears at the same level.
//!
//! Examples:
//!
//! ```text
//! sf_&_{dog_|_cat}        sf members who are also on dog or cat
//! {sf_&_dog}_|_cat        sf members on dog, plus everyone on cat
//! sf_&_dog_|_cat          INVALID: mixed operators without braces
//! sf_&_dog_&_cat          chains of one operator need no braces
//! sf_-_dog_-_cat          difference is left-associative
//! ```
//!
//! An identifier is a run of alphanumerics joined by single `_`, `.`, or `-`
//! separators, which is what keeps `a_b` one identifier while `a_-_b` is a
//! difference: a separator is only consumed when the character after it is
//! alphanumeric.

use std::fmt;

use thiserror::Error;

use crate::set::expr::{Expr, SetOp};

/// Why a local part failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A `{` with no matching `}`, or a `}` with no open group.
    MismatchedBrace,
    /// A brace directly adjacent to an identifier or another group, with no
    /// operator between them.
    MisplacedBrace,
    /// Two different operators in one unbraced chain.
    MixedOperators,
    /// `{}` with nothing inside.
    EmptyGroup,
    /// An operator with a missing operand, or an empty local part.
    EmptyOperand,
    /// A character that starts neither an identifier, an operator spelling,
    /// nor a brace.
    BadIdentifier,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseErrorKind::MismatchedBrace => "mismatched_brace",
            ParseErrorKind::MisplacedBrace => "misplaced_brace",
            ParseErrorKind::MixedOperators => "mixed_operators",
            ParseErrorKind::EmptyGroup => "empty_group",
            ParseErrorKind::EmptyOperand => "empty_operand",
            ParseErrorKind::BadIdentifier => "bad_identifier",
        };
        f.write_str(name)
    }
}

/// A parse failure, with a 1-based character position into the local part.
///
/// The rendered form is suitable for an SMTP reply and the resulting bounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parse error: {reason} at character {position}")]
pub struct ParseError {
    pub reason: ParseErrorKind,
    pub position: usize,
}

impl ParseError {
    fn new(reason: ParseErrorKind, position: usize) -> Self {
        ParseError { reason, position }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Op(SetOp),
    Open,
    Close,
}

/// Splits a local part into tokens, each paired with its 1-based position.
fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let start = i;
        match chars[i] {
            '{' => {
                tokens.push((Token::Open, start + 1));
                i += 1;
            }
            '}' => {
                tokens.push((Token::Close, start + 1));
                i += 1;
            }
            c if c.is_ascii_alphanumeric() => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                // Absorb separator-joined runs, but never an operator
                // spelling: the separator must be followed by an
                // alphanumeric to belong to the identifier.
                while i + 1 < chars.len()
                    && is_separator(chars[i])
                    && chars[i + 1].is_ascii_alphanumeric()
                {
                    i += 2;
                    while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                        i += 1;
                    }
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push((Token::Ident(ident), start + 1));
            }
            _ => {
                if let Some(op) = operator_at(&chars, i) {
                    tokens.push((Token::Op(op), start + 1));
                    i += 3;
                } else {
                    return Err(ParseError::new(ParseErrorKind::BadIdentifier, start + 1));
                }
            }
        }
    }

    Ok(tokens)
}

fn is_separator(c: char) -> bool {
    c == '_' || c == '.' || c == '-'
}

fn operator_at(chars: &[char], i: usize) -> Option<SetOp> {
    if chars.get(i) != Some(&'_') || chars.get(i + 2) != Some(&'_') {
        return None;
    }
    match chars.get(i + 1) {
        Some('|') => Some(SetOp::Union),
        Some('&') => Some(SetOp::Inter),
        Some('-') => Some(SetOp::Diff),
        _ => None,
    }
}

/// Parses a recipient local part into an expression tree.
///
/// The `@domain` suffix must already be stripped. Identifiers are kept
/// verbatim; resolution lowercases them later.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let end = input.chars().count() + 1;
    let mut pos = 0;
    let expr = parse_chain(&tokens, &mut pos, end, false)?;

    match tokens.get(pos) {
        None => Ok(expr),
        // parse_chain only stops early on a closing brace; at the top level
        // there is no open group for it to match.
        Some((_, p)) => Err(ParseError::new(ParseErrorKind::MismatchedBrace, *p)),
    }
}

/// Parses a chain of same-operator applications. Stops before a `}` so the
/// enclosing group can consume it, or at end of input.
fn parse_chain(
    tokens: &[(Token, usize)],
    pos: &mut usize,
    end: usize,
    in_group: bool,
) -> Result<Expr, ParseError> {
    let mut left = parse_atom(tokens, pos, end, in_group)?;
    let mut chain_op: Option<SetOp> = None;

    loop {
        match tokens.get(*pos) {
            Some((Token::Op(op), p)) => {
                // Chains may repeat one operator; anything else needs braces.
                if chain_op.is_some_and(|prev| prev != *op) {
                    return Err(ParseError::new(ParseErrorKind::MixedOperators, *p));
                }
                chain_op = Some(*op);
                *pos += 1;
                let right = parse_atom(tokens, pos, end, in_group)?;
                left = Expr::binary(*op, left, right);
            }
            Some((Token::Close, _)) | None => return Ok(left),
            Some((Token::Open | Token::Ident(_), p)) => {
                return Err(ParseError::new(ParseErrorKind::MisplacedBrace, *p));
            }
        }
    }
}

fn parse_atom(
    tokens: &[(Token, usize)],
    pos: &mut usize,
    end: usize,
    in_group: bool,
) -> Result<Expr, ParseError> {
    match tokens.get(*pos) {
        Some((Token::Ident(name), _)) => {
            *pos += 1;
            Ok(Expr::leaf(name))
        }
        Some((Token::Open, p)) => {
            let open_pos = *p;
            *pos += 1;
            if let Some((Token::Close, _)) = tokens.get(*pos) {
                return Err(ParseError::new(ParseErrorKind::EmptyGroup, open_pos));
            }
            let mut inner = parse_chain(tokens, pos, end, true)?;
            match tokens.get(*pos) {
                Some((Token::Close, _)) => {
                    *pos += 1;
                    inner.braced = true;
                    Ok(inner)
                }
                None => Err(ParseError::new(ParseErrorKind::MismatchedBrace, open_pos)),
                // parse_chain only stops on Close or end of input.
                Some((_, p)) => Err(ParseError::new(ParseErrorKind::MismatchedBrace, *p)),
            }
        }
        Some((Token::Op(_), p)) => Err(ParseError::new(ParseErrorKind::EmptyOperand, *p)),
        Some((Token::Close, p)) => {
            if in_group {
                Err(ParseError::new(ParseErrorKind::EmptyOperand, *p))
            } else {
                Err(ParseError::new(ParseErrorKind::MismatchedBrace, *p))
            }
        }
        None => Err(ParseError::new(ParseErrorKind::EmptyOperand, end)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Expr {
        Expr::leaf(name)
    }

    fn braced(mut expr: Expr) -> Expr {
        expr.braced = true;
        expr
    }

    fn reason_at(input: &str) -> (ParseErrorKind, usize) {
        let err = parse(input).unwrap_err();
        (err.reason, err.position)
    }

    #[test]
    fn single_identifier() {
        assert_eq!(parse("alist").unwrap(), leaf("alist"));
    }

    #[test]
    fn identifier_with_separators() {
        assert_eq!(parse("bob.q.brown").unwrap(), leaf("bob.q.brown"));
        assert_eq!(parse("a_b-c.d").unwrap(), leaf("a_b-c.d"));
    }

    #[test]
    fn case_preserved_verbatim() {
        assert_eq!(parse("SF").unwrap(), leaf("SF"));
    }

    #[test]
    fn single_in_braces() {
        assert_eq!(parse("{alist}").unwrap(), braced(leaf("alist")));
    }

    #[test]
    fn simple_union() {
        assert_eq!(
            parse("alist_|_blist").unwrap(),
            Expr::binary(SetOp::Union, leaf("alist"), leaf("blist")),
        );
    }

    #[test]
    fn simple_intersection() {
        assert_eq!(
            parse("alist_&_blist").unwrap(),
            Expr::binary(SetOp::Inter, leaf("alist"), leaf("blist")),
        );
    }

    #[test]
    fn simple_difference() {
        assert_eq!(
            parse("alist_-_blist").unwrap(),
            Expr::binary(SetOp::Diff, leaf("alist"), leaf("blist")),
        );
    }

    #[test]
    fn chain_is_left_associative() {
        assert_eq!(
            parse("a_-_b_-_c").unwrap(),
            Expr::binary(
                SetOp::Diff,
                Expr::binary(SetOp::Diff, leaf("a"), leaf("b")),
                leaf("c"),
            ),
        );
    }

    #[test]
    fn union_chain_without_braces() {
        assert_eq!(
            parse("a_|_b_|_c").unwrap(),
            Expr::binary(
                SetOp::Union,
                Expr::binary(SetOp::Union, leaf("a"), leaf("b")),
                leaf("c"),
            ),
        );
    }

    #[test]
    fn braced_left_operand() {
        assert_eq!(
            parse("{a_-_b}_|_c").unwrap(),
            Expr::binary(
                SetOp::Union,
                braced(Expr::binary(SetOp::Diff, leaf("a"), leaf("b"))),
                leaf("c"),
            ),
        );
    }

    #[test]
    fn braced_right_operand() {
        assert_eq!(
            parse("a_-_{b_|_c}").unwrap(),
            Expr::binary(
                SetOp::Diff,
                leaf("a"),
                braced(Expr::binary(SetOp::Union, leaf("b"), leaf("c"))),
            ),
        );
    }

    #[test]
    fn nested_groups() {
        assert_eq!(
            parse("{a_&_{b_|_c}}").unwrap(),
            braced(Expr::binary(
                SetOp::Inter,
                leaf("a"),
                braced(Expr::binary(SetOp::Union, leaf("b"), leaf("c"))),
            )),
        );
    }

    #[test]
    fn mixed_inside_group_also_rejected() {
        assert_eq!(reason_at("{a_&_b_|_c}").0, ParseErrorKind::MixedOperators);
    }

    #[test]
    fn mixed_operators_rejected() {
        let (reason, position) = reason_at("sf_&_dog_|_cat");
        assert_eq!(reason, ParseErrorKind::MixedOperators);
        assert_eq!(position, 9);
    }

    #[test]
    fn mixed_allowed_across_brace_levels() {
        assert!(parse("{a_|_b}_&_{c_-_d}").is_ok());
        assert!(parse("{a_|_b}_&_c_&_d").is_ok());
    }

    #[test]
    fn unmatched_open_brace() {
        let (reason, position) = reason_at("{alist");
        assert_eq!(reason, ParseErrorKind::MismatchedBrace);
        assert_eq!(position, 1);
    }

    #[test]
    fn unmatched_close_brace() {
        let (reason, position) = reason_at("a_&_b}_-_c");
        assert_eq!(reason, ParseErrorKind::MismatchedBrace);
        assert_eq!(position, 6);
    }

    #[test]
    fn surplus_close_brace_after_group() {
        assert_eq!(reason_at("{a_&_b}}").0, ParseErrorKind::MismatchedBrace);
    }

    #[test]
    fn brace_after_identifier() {
        assert_eq!(reason_at("alist{blist}").0, ParseErrorKind::MisplacedBrace);
    }

    #[test]
    fn identifier_after_group() {
        assert_eq!(reason_at("{alist}blist").0, ParseErrorKind::MisplacedBrace);
    }

    #[test]
    fn adjacent_groups() {
        assert_eq!(reason_at("{a}{b}").0, ParseErrorKind::MisplacedBrace);
    }

    #[test]
    fn empty_group() {
        assert_eq!(reason_at("{}"), (ParseErrorKind::EmptyGroup, 1));
        assert_eq!(reason_at("a_&_{}").0, ParseErrorKind::EmptyGroup);
    }

    #[test]
    fn leading_operator() {
        assert_eq!(reason_at("_|_alist"), (ParseErrorKind::EmptyOperand, 1));
        assert_eq!(reason_at("_&_alist").0, ParseErrorKind::EmptyOperand);
        assert_eq!(reason_at("_-_alist").0, ParseErrorKind::EmptyOperand);
    }

    #[test]
    fn trailing_operator() {
        assert_eq!(reason_at("alist_&_"), (ParseErrorKind::EmptyOperand, 9));
    }

    #[test]
    fn doubled_operator() {
        assert_eq!(reason_at("a_|__|_b").0, ParseErrorKind::EmptyOperand);
    }

    #[test]
    fn operand_missing_inside_group() {
        assert_eq!(reason_at("{a_&_}").0, ParseErrorKind::EmptyOperand);
    }

    #[test]
    fn close_brace_without_group_after_operator() {
        assert_eq!(reason_at("alist_&_}").0, ParseErrorKind::MismatchedBrace);
    }

    #[test]
    fn empty_input() {
        assert_eq!(reason_at(""), (ParseErrorKind::EmptyOperand, 1));
    }

    #[test]
    fn unknown_operator_character() {
        let (reason, position) = reason_at("alist_+_blist");
        assert_eq!(reason, ParseErrorKind::BadIdentifier);
        assert_eq!(position, 6);
    }

    #[test]
    fn stray_separator() {
        assert_eq!(reason_at("-abc").0, ParseErrorKind::BadIdentifier);
        assert_eq!(reason_at("a-_b").0, ParseErrorKind::BadIdentifier);
    }

    #[test]
    fn whitespace_rejected() {
        assert_eq!(reason_at("a b").0, ParseErrorKind::BadIdentifier);
    }

    #[test]
    fn error_display_names_reason_and_position() {
        let err = parse("a_&_b}_-_c").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse error: mismatched_brace at character 6",
        );
    }
}
