//! SMTP session state management

use crate::set::ResolvedRecipient;
use crate::smtp::error::{SmtpError, SmtpLimits};

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO/EHLO
    Initial,
    /// Greeting received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT commands
    MailReceived,
    /// At least one RCPT TO accepted - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA command received - collecting message lines
    DataMode,
}

/// A completed transaction, handed to the relay dispatcher.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Envelope sender from MAIL FROM. Empty for the null reverse-path.
    pub sender: String,
    /// The accepted recipient expressions, each already resolved.
    pub recipients: Vec<ResolvedRecipient>,
    /// Raw message lines as received, dot-unstuffed, without line endings.
    pub data: Vec<String>,
}

/// Manages the state and data for a single SMTP session
#[derive(Debug)]
pub struct SmtpSession {
    /// Current state of the session
    pub state: SmtpState,
    /// Sender address from MAIL FROM command
    pub from: Option<String>,
    /// Accepted recipient expressions from RCPT TO commands
    pub recipients: Vec<ResolvedRecipient>,
    /// Message lines collected during DATA mode
    pub data: Vec<String>,
    /// Whether we're currently in data collection mode
    pub in_data_mode: bool,
    /// Total size of data collected so far
    pub data_size: usize,
    /// Client domain from HELO/EHLO command
    pub client_domain: Option<String>,
    /// Upper bound on buffered message size
    max_message_size: usize,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: SmtpState::Initial,
            from: None,
            recipients: Vec::new(),
            data: Vec::new(),
            in_data_mode: false,
            data_size: 0,
            client_domain: None,
            max_message_size,
        }
    }

    /// Reset the session to post-greeting state (clears transaction data)
    pub fn reset(&mut self) {
        self.state = SmtpState::GreetingReceived;
        self.from = None;
        self.recipients.clear();
        self.data.clear();
        self.in_data_mode = false;
        self.data_size = 0;
        // Keep client_domain as it's set by HELO
    }

    /// Set the sender address. The empty string is the null reverse-path.
    pub fn set_sender(&mut self, sender: String) -> Result<(), SmtpError> {
        if sender.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        self.from = Some(sender);
        self.recipients.clear();
        self.data.clear();
        self.data_size = 0;
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    /// Record an accepted recipient expression
    pub fn add_recipient(&mut self, recipient: ResolvedRecipient) -> Result<(), SmtpError> {
        if self.recipients.len() >= SmtpLimits::MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: SmtpLimits::MAX_RECIPIENTS,
            });
        }

        self.recipients.push(recipient);
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Start data collection mode
    pub fn start_data_mode(&mut self) -> Result<(), SmtpError> {
        if self.state != SmtpState::RecipientsReceived {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        self.in_data_mode = true;
        self.data.clear();
        self.data_size = 0;
        self.state = SmtpState::DataMode;
        Ok(())
    }

    /// Add a line of data during data collection
    pub fn add_data_line(&mut self, line: String) -> Result<(), SmtpError> {
        let line_size = line.len() + 2; // +2 for CRLF

        if line_size > SmtpLimits::TEXT_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
            });
        }

        if self.data_size + line_size > self.max_message_size {
            return Err(SmtpError::TooMuchData {
                max: self.max_message_size,
            });
        }

        self.data.push(line);
        self.data_size += line_size;
        Ok(())
    }

    /// Finish data collection and take the completed transaction
    pub fn finish_data(&mut self) -> Result<Transaction, SmtpError> {
        if !self.in_data_mode {
            return Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            ));
        }

        let sender = self
            .from
            .clone()
            .ok_or_else(|| SmtpError::InvalidState("No sender specified".to_string()))?;

        if self.recipients.is_empty() {
            return Err(SmtpError::InvalidState(
                "No recipients specified".to_string(),
            ));
        }

        let transaction = Transaction {
            sender,
            recipients: std::mem::take(&mut self.recipients),
            data: std::mem::take(&mut self.data),
        };

        self.in_data_mode = false;
        self.from = None;
        self.data_size = 0;
        self.state = SmtpState::GreetingReceived;
        Ok(transaction)
    }

    /// Set the client domain from HELO/EHLO command
    pub fn set_client_domain(&mut self, domain: String) -> Result<(), SmtpError> {
        if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        self.client_domain = Some(domain);
        self.reset(); // Clear any existing transaction
        Ok(())
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command.to_uppercase().as_str() {
            "HELO" | "EHLO" => true, // Greeting can be sent at any time
            "MAIL" => self.state == SmtpState::GreetingReceived,
            "RCPT" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            "DATA" => self.state == SmtpState::RecipientsReceived,
            "RSET" => self.state != SmtpState::Initial,
            "NOOP" => true, // NOOP can be sent at any time
            "QUIT" => true, // QUIT can be sent at any time
            _ => false,
        }
    }

    /// Get the current recipient count
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const MAX: usize = 10 * 1024 * 1024;

    fn recipient(local_part: &str, addrs: &[&str]) -> ResolvedRecipient {
        ResolvedRecipient {
            local_part: local_part.to_string(),
            tag: local_part.to_uppercase(),
            addresses: addrs.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_new_session() {
        let session = SmtpSession::new(MAX);
        assert_eq!(session.state, SmtpState::Initial);
        assert!(session.from.is_none());
        assert!(session.recipients.is_empty());
        assert!(session.data.is_empty());
        assert!(!session.in_data_mode);
        assert_eq!(session.data_size, 0);
        assert!(session.client_domain.is_none());
    }

    #[test]
    fn test_set_client_domain() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();

        assert_eq!(session.state, SmtpState::GreetingReceived);
        assert_eq!(session.client_domain, Some("client.local".to_string()));
    }

    #[test]
    fn test_domain_too_long() {
        let mut session = SmtpSession::new(MAX);
        let long_domain = "a".repeat(SmtpLimits::DOMAIN_MAX_LENGTH + 1);

        let result = session.set_client_domain(long_domain);
        assert!(matches!(result, Err(SmtpError::DomainTooLong { .. })));
    }

    #[test]
    fn test_set_sender() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();

        session
            .set_sender("sender@example.com".to_string())
            .unwrap();
        assert_eq!(session.from, Some("sender@example.com".to_string()));
        assert_eq!(session.state, SmtpState::MailReceived);
    }

    #[test]
    fn test_null_sender_allowed() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();

        session.set_sender(String::new()).unwrap();
        assert_eq!(session.from, Some(String::new()));
        assert_eq!(session.state, SmtpState::MailReceived);
    }

    #[test]
    fn test_sender_path_too_long() {
        let mut session = SmtpSession::new(MAX);
        let long_path = "a".repeat(SmtpLimits::PATH_MAX_LENGTH + 1);

        let result = session.set_sender(long_path);
        assert!(matches!(result, Err(SmtpError::PathTooLong { .. })));
    }

    #[test]
    fn test_add_recipient() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();

        session
            .add_recipient(recipient("sf", &["alice@x", "bob@x"]))
            .unwrap();
        assert_eq!(session.recipient_count(), 1);
        assert_eq!(session.recipients[0].local_part, "sf");
        assert_eq!(session.state, SmtpState::RecipientsReceived);
    }

    #[test]
    fn test_too_many_recipients() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();

        for i in 0..SmtpLimits::MAX_RECIPIENTS {
            session
                .add_recipient(recipient(&format!("list{i}"), &["user@x"]))
                .unwrap();
        }

        let result = session.add_recipient(recipient("extra", &["user@x"]));
        assert!(matches!(result, Err(SmtpError::TooManyRecipients { .. })));
    }

    #[test]
    fn test_data_collection() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();
        session
            .add_recipient(recipient("sf", &["alice@x"]))
            .unwrap();

        session.start_data_mode().unwrap();
        assert!(session.in_data_mode);
        assert_eq!(session.state, SmtpState::DataMode);

        session.add_data_line("Subject: Test".to_string()).unwrap();
        session.add_data_line("".to_string()).unwrap();
        session.add_data_line("Test body".to_string()).unwrap();

        let transaction = session.finish_data().unwrap();
        assert_eq!(transaction.sender, "sender@example.com");
        assert_eq!(transaction.recipients.len(), 1);
        assert_eq!(
            transaction.data,
            vec!["Subject: Test", "", "Test body"],
        );
        assert!(!session.in_data_mode);
        assert_eq!(session.state, SmtpState::GreetingReceived);
    }

    #[test]
    fn test_line_too_long() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();
        session
            .add_recipient(recipient("sf", &["alice@x"]))
            .unwrap();
        session.start_data_mode().unwrap();

        let long_line = "a".repeat(SmtpLimits::TEXT_LINE_MAX_LENGTH + 1);
        let result = session.add_data_line(long_line);
        assert!(matches!(result, Err(SmtpError::LineTooLong { .. })));
    }

    #[test]
    fn test_message_size_cap() {
        let mut session = SmtpSession::new(16);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();
        session
            .add_recipient(recipient("sf", &["alice@x"]))
            .unwrap();
        session.start_data_mode().unwrap();

        session.add_data_line("0123456789".to_string()).unwrap();
        let result = session.add_data_line("0123456789".to_string());
        assert!(matches!(result, Err(SmtpError::TooMuchData { .. })));
    }

    #[test]
    fn test_can_execute_command() {
        let mut session = SmtpSession::new(MAX);

        // Initial state
        assert!(session.can_execute_command("HELO"));
        assert!(session.can_execute_command("EHLO"));
        assert!(session.can_execute_command("NOOP"));
        assert!(session.can_execute_command("QUIT"));
        assert!(!session.can_execute_command("MAIL"));
        assert!(!session.can_execute_command("RCPT"));
        assert!(!session.can_execute_command("DATA"));
        assert!(!session.can_execute_command("RSET"));

        // After HELO
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        assert!(session.can_execute_command("MAIL"));
        assert!(session.can_execute_command("RSET"));
        assert!(!session.can_execute_command("RCPT"));
        assert!(!session.can_execute_command("DATA"));

        // After MAIL
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();
        assert!(session.can_execute_command("RCPT"));
        assert!(!session.can_execute_command("DATA"));

        // After RCPT
        session
            .add_recipient(recipient("sf", &["alice@x"]))
            .unwrap();
        assert!(session.can_execute_command("DATA"));
        assert!(session.can_execute_command("RCPT")); // Can add more recipients
    }

    #[test]
    fn test_reset() {
        let mut session = SmtpSession::new(MAX);
        session
            .set_client_domain("client.local".to_string())
            .unwrap();
        session
            .set_sender("sender@example.com".to_string())
            .unwrap();
        session
            .add_recipient(recipient("sf", &["alice@x"]))
            .unwrap();

        session.reset();

        assert_eq!(session.state, SmtpState::GreetingReceived);
        assert!(session.from.is_none());
        assert!(session.recipients.is_empty());
        assert!(session.data.is_empty());
        assert!(!session.in_data_mode);
        assert_eq!(session.data_size, 0);
        // Should keep client domain
        assert_eq!(session.client_domain, Some("client.local".to_string()));
    }
}
