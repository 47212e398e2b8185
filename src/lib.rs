//! # Mailing Set
//!
//! Mailing Set is an SMTP server that treats mailing lists as sets of
//! recipients and accepts mail addressed to set-algebraic expressions over
//! them.
//!
//! The local part of a recipient address is an expression in which leaves
//! are mailing list names or individual identifiers, the operators are `_|_`
//! (union), `_&_` (intersection), and `_-_` (difference), and `{ }` groups
//! subexpressions:
//!
//! ```text
//! RCPT TO:<sf_&_dog@example.org>         sf members who are also on dog
//! RCPT TO:<sf_&_{dog_|_cat}@example.org> sf members on dog or cat
//! RCPT TO:<dog_-_alice@example.org>      dog members except alice
//! ```
//!
//! An accepted message is redelivered through an outbound relay to every
//! address the expression evaluates to, with a compact subject tag such as
//! `[SF&(Dog|Cat)]` and the usual mailing-list headers added.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use mailingset::{Config, LettreTransport, SmtpServer, Universe};
//!
//! let config = Config::load(Path::new("mailingset.toml")).unwrap();
//! let universe =
//!     Universe::load(&config.data.lists_dir, &config.data.symbols_file).unwrap();
//! let server = SmtpServer::new(config, universe, Arc::new(LettreTransport)).unwrap();
//! server.start().unwrap();
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender (no extensions advertised)
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify a set expression (multiple expressions are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! ## Notes
//!
//! - Lists are defined as files on disk and loaded once at startup; there
//!   is no reload without a restart.
//! - Access control is by peer IP only; SMTP authentication and TLS are not
//!   supported.
//! - The server holds no state across restarts.

pub mod config;
pub mod message;
pub mod relay;
pub mod set;
pub mod smtp;

pub use config::{Config, ConfigError};
pub use relay::{Delivery, LettreTransport, MailTransport, RelayDispatcher, TransportError};
pub use set::{
    resolve_recipient, Expr, ParseError, ParseErrorKind, RecipientError, ResolveError,
    ResolvedRecipient, Universe, UniverseError,
};
pub use smtp::{SmtpError, SmtpLimits, SmtpResponse, SmtpServer, SmtpSession, SmtpState};
