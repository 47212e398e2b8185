//! Outbound delivery of expanded messages.
//!
//! The dispatcher fans a completed transaction out to one message per
//! resolved address through an injected [`MailTransport`]. Production wires
//! in [`LettreTransport`]; tests substitute a capturing transport.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use log::{error, info};
use thiserror::Error;

use crate::config::Outgoing;

/// Error reported by an outbound SMTP client.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The injected outbound SMTP client.
pub trait MailTransport: Send + Sync {
    /// Sends one message to the given recipients through the given relay.
    fn send(
        &self,
        server: &str,
        port: u16,
        envelope_sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<(), TransportError>;
}

/// Errors surfaced synchronously by [`RelayDispatcher::dispatch`]. Anything
/// after hand-off is logged instead, because the session has already been
/// answered.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("could not start delivery worker: {0}")]
    Handoff(#[from] std::io::Error),
}

/// One rewritten message paired with the addresses its expression resolved
/// to.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub addresses: BTreeSet<String>,
    pub message: String,
}

/// Fans accepted transactions out through the configured relay.
#[derive(Clone)]
pub struct RelayDispatcher {
    outgoing: Outgoing,
    transport: Arc<dyn MailTransport>,
}

impl RelayDispatcher {
    pub fn new(outgoing: Outgoing, transport: Arc<dyn MailTransport>) -> Self {
        RelayDispatcher {
            outgoing,
            transport,
        }
    }

    /// Queues one outbound message per address of every delivery, plus one
    /// archive copy per delivery when an archive address is configured.
    ///
    /// Returns once the delivery worker owns the batch; the caller may then
    /// answer the session. Send failures after that point are logged and
    /// left to the downstream MTA's bounce machinery.
    pub fn dispatch(&self, deliveries: Vec<Delivery>) -> Result<(), RelayError> {
        let mut batch = Vec::new();
        for delivery in deliveries {
            for addr in &delivery.addresses {
                batch.push((addr.clone(), delivery.message.clone()));
            }
            if let Some(archive) = &self.outgoing.archive_addr {
                batch.push((archive.clone(), delivery.message));
            }
        }

        let outgoing = self.outgoing.clone();
        let transport = Arc::clone(&self.transport);
        thread::Builder::new()
            .name("relay".to_string())
            .spawn(move || {
                for (recipient, message) in batch {
                    let result = transport.send(
                        &outgoing.server,
                        outgoing.port,
                        &outgoing.envelope_sender,
                        std::slice::from_ref(&recipient),
                        message.as_bytes(),
                    );
                    match result {
                        Ok(()) => info!("relayed to {recipient}"),
                        Err(err) => error!("relay to {recipient} failed: {err}"),
                    }
                }
            })?;
        Ok(())
    }
}

/// Production transport backed by lettre's blocking SMTP client.
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreTransport;

impl MailTransport for LettreTransport {
    fn send(
        &self,
        server: &str,
        port: u16,
        envelope_sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<(), TransportError> {
        use lettre::address::Envelope;
        use lettre::{Address, SmtpTransport, Transport};

        let reverse_path = if envelope_sender.is_empty() {
            None
        } else {
            let parsed = envelope_sender
                .parse::<Address>()
                .map_err(|err| TransportError(format!("bad envelope sender: {err}")))?;
            Some(parsed)
        };
        let forward_paths = recipients
            .iter()
            .map(|recipient| recipient.parse::<Address>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| TransportError(format!("bad recipient: {err}")))?;
        let envelope = Envelope::new(reverse_path, forward_paths)
            .map_err(|err| TransportError(err.to_string()))?;

        let mailer = SmtpTransport::builder_dangerous(server).port(port).build();
        mailer
            .send_raw(&envelope, message)
            .map_err(|err| TransportError(err.to_string()))?;
        Ok(())
    }
}
