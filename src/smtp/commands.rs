//! Implementation of SMTP commands

use log::info;

use crate::set::{resolve_recipient, Universe};
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

/// Handles SMTP commands and returns appropriate responses
pub struct SmtpCommandHandler<'a> {
    /// The configured incoming domain, doubling as the server hostname
    domain: &'a str,
    universe: &'a Universe,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler
    pub fn new(domain: &'a str, universe: &'a Universe) -> Self {
        Self { domain, universe }
    }

    /// Process a command line and return a response
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        // Check command line length
        if command_line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let parts: Vec<&str> = command_line.split_whitespace().collect();
        if parts.is_empty() {
            return Err(SmtpError::InvalidCommand);
        }

        let cmd = parts[0].to_uppercase();

        match cmd.as_str() {
            "HELO" | "EHLO" => self.handle_helo(parts, session),
            "MAIL" => self.handle_mail(parts, session),
            "RCPT" => self.handle_rcpt(parts, session),
            "DATA" => self.handle_data(parts, session),
            "RSET" => self.handle_rset(session),
            "NOOP" => self.handle_noop(),
            "QUIT" => self.handle_quit(),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// Handle HELO/EHLO. No extensions are advertised, so both get the
    /// same single-line acknowledgement.
    fn handle_helo(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "HELO requires domain argument".to_string(),
            ));
        }

        let client_domain = parts[1].to_string();
        session.set_client_domain(client_domain.clone())?;

        Ok(SmtpResponse::helo(self.domain, &client_domain))
    }

    /// Handle MAIL command
    fn handle_mail(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("MAIL") {
            return Err(SmtpError::InvalidState(
                "MAIL command requires HELO first".to_string(),
            ));
        }

        let addr = extract_address(&parts, "FROM:")?;

        // Accept any syntactically valid sender, including the null
        // reverse-path of bounce messages. It is recorded for bounce
        // attribution only.
        if !addr.is_empty() {
            self.validate_email_address(&addr)?;
        }

        session.set_sender(addr)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle RCPT command: the recipient address must carry the incoming
    /// domain and its local part must parse and evaluate to a non-empty set.
    fn handle_rcpt(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RCPT") {
            return Err(SmtpError::InvalidState(
                "RCPT command requires MAIL first".to_string(),
            ));
        }

        let addr = extract_address(&parts, "TO:")?;
        if addr.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "TO address cannot be empty".to_string(),
            ));
        }

        // The local part is a set expression, not a mailbox name, so the
        // mailbox length checks do not apply here; parse, resolve, and
        // evaluate decide validity.
        match resolve_recipient(&addr, self.universe, self.domain) {
            Ok(resolved) => {
                info!(
                    "accepted recipient {} -> {} address(es)",
                    addr,
                    resolved.addresses.len(),
                );
                session.add_recipient(resolved)?;
                Ok(SmtpResponse::ok())
            }
            Err(err) => {
                info!("rejected recipient {addr}: {err}");
                Ok(SmtpResponse::rejected(&err.to_string()))
            }
        }
    }

    /// Handle DATA command
    fn handle_data(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("DATA") {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        if parts.len() > 1 {
            return Err(SmtpError::InvalidSyntax(
                "DATA command takes no arguments".to_string(),
            ));
        }

        session.start_data_mode()?;

        Ok(SmtpResponse::data_start())
    }

    /// Handle RSET command
    fn handle_rset(&self, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RSET") {
            return Err(SmtpError::InvalidState(
                "RSET command requires HELO first".to_string(),
            ));
        }

        session.reset();
        Ok(SmtpResponse::ok())
    }

    /// Handle NOOP command
    fn handle_noop(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }

    /// Handle QUIT command
    fn handle_quit(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::quit())
    }

    /// Validate reverse-path format and mailbox size limits. Only MAIL FROM
    /// addresses are plain mailboxes; RCPT TO local parts are expressions.
    fn validate_email_address(&self, addr: &str) -> Result<(), SmtpError> {
        // Check for @ symbol
        if let Some(at_pos) = addr.find('@') {
            let user_part = &addr[..at_pos];
            let domain_part = &addr[at_pos + 1..];

            // Check user part length
            if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
                return Err(SmtpError::UserTooLong {
                    max: SmtpLimits::USER_MAX_LENGTH,
                });
            }

            // Check domain part length
            if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
                return Err(SmtpError::DomainTooLong {
                    max: SmtpLimits::DOMAIN_MAX_LENGTH,
                });
            }

            // Basic validation - must have user and domain parts
            if user_part.is_empty() || domain_part.is_empty() {
                return Err(SmtpError::InvalidSyntax(
                    "Invalid email address format".to_string(),
                ));
            }
        } else {
            return Err(SmtpError::InvalidSyntax(
                "Email address must contain @ symbol".to_string(),
            ));
        }

        Ok(())
    }
}

/// Extracts the angle-bracketed address from `MAIL FROM:<...>` or
/// `RCPT TO:<...>`. Returns the empty string for `<>`.
fn extract_address(parts: &[&str], keyword: &str) -> Result<String, SmtpError> {
    if parts.len() < 2 {
        return Err(SmtpError::InvalidSyntax(format!(
            "{} requires {} argument",
            parts[0].to_uppercase(),
            keyword.trim_end_matches(':'),
        )));
    }

    let arg = parts[1..].join(" ");
    if !arg.to_uppercase().starts_with(keyword) {
        return Err(SmtpError::InvalidSyntax(format!(
            "expected {}<address>",
            keyword,
        )));
    }

    let addr = arg[keyword.len()..].trim();
    if !addr.starts_with('<') || !addr.ends_with('>') {
        return Err(SmtpError::InvalidSyntax(
            "address must be enclosed in angle brackets".to_string(),
        ));
    }

    Ok(addr[1..addr.len() - 1].to_string())
}
