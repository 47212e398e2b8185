//! SMTP server implementation

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use cidr::IpCidr;
use log::{error, info, warn};

use crate::config::{Config, ConfigError};
use crate::message;
use crate::relay::{Delivery, MailTransport, RelayDispatcher};
use crate::set::Universe;
use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

/// The SMTP server: accepts connections, runs the per-connection state
/// machine, and hands completed transactions to the relay dispatcher.
///
/// Each connection gets its own thread; the universe and configuration are
/// shared read-only behind `Arc`.
#[derive(Clone)]
pub struct SmtpServer {
    config: Arc<Config>,
    universe: Arc<Universe>,
    relay: RelayDispatcher,
    accept_from: Option<Arc<Vec<IpCidr>>>,
}

impl SmtpServer {
    /// Create a new SMTP server. Fails if `accept_from` holds a bad CIDR.
    pub fn new(
        config: Config,
        universe: Universe,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, ConfigError> {
        let accept_from = config.incoming.accept_from_cidrs()?.map(Arc::new);
        let relay = RelayDispatcher::new(config.outgoing.clone(), transport);
        Ok(Self {
            config: Arc::new(config),
            universe: Arc::new(universe),
            relay,
            accept_from,
        })
    }

    /// Bind the configured address and serve forever (blocking)
    pub fn start(&self) -> Result<(), SmtpError> {
        let addr = format!(
            "{}:{}",
            self.config.incoming.bind, self.config.incoming.port,
        );
        let listener = TcpListener::bind(&addr)?;
        info!("listening on {addr}");
        self.serve(listener)
    }

    /// Serve connections from an existing listener (blocking)
    pub fn serve(&self, listener: TcpListener) -> Result<(), SmtpError> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    thread::spawn(move || {
                        if let Err(e) = server.handle_client(stream) {
                            warn!("error handling client: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_client(&self, mut stream: TcpStream) -> Result<(), SmtpError> {
        let peer = stream.peer_addr()?;
        if !self.peer_allowed(peer.ip()) {
            info!("refusing connection from {peer}");
            self.send_response(
                &mut stream,
                &SmtpResponse::refused("Connections from this address are not accepted"),
            )?;
            return Ok(());
        }
        info!("connection from {peer}");

        stream.set_read_timeout(Some(SmtpLimits::COMMAND_TIMEOUT))?;
        let deadline = Instant::now() + SmtpLimits::SESSION_TIMEOUT;

        let handler = SmtpCommandHandler::new(&self.config.incoming.domain, &self.universe);
        let mut session = SmtpSession::new(self.config.incoming.max_message_size);
        let mut reader = BufReader::new(stream.try_clone()?);

        // Send greeting
        self.send_response(&mut stream, &SmtpResponse::greeting(&self.config.incoming.domain))?;

        let mut line_buffer = Vec::new();
        loop {
            line_buffer.clear();

            match reader.read_until(b'\n', &mut line_buffer) {
                Ok(0) => break, // Connection closed
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    info!("closing idle connection from {peer}");
                    self.send_response(&mut stream, &SmtpResponse::timeout())?;
                    break;
                }
                Err(e) => {
                    warn!("error reading from {peer}: {e}");
                    break;
                }
            }

            if Instant::now() >= deadline {
                info!("closing connection from {peer}: session timeout");
                self.send_response(&mut stream, &SmtpResponse::timeout())?;
                break;
            }

            // Invalid UTF-8 is replaced rather than rejected; header
            // rewriting only relies on the ASCII subset.
            let raw = String::from_utf8_lossy(&line_buffer);
            let line = raw.trim_end_matches(['\r', '\n']);

            if session.in_data_mode {
                match self.handle_data_line(line, &mut session) {
                    Ok(Some(response)) => {
                        self.send_response(&mut stream, &response)?;
                    }
                    Ok(None) => {
                        // Continue collecting data
                    }
                    Err(e) => {
                        let response =
                            SmtpResponse::error(e.to_response_code(), &e.to_response_message());
                        self.send_response(&mut stream, &response)?;
                        session.reset();
                    }
                }
            } else {
                let command = line.trim();
                if command.is_empty() {
                    continue;
                }

                match handler.process_command(command, &mut session) {
                    Ok(response) => {
                        self.send_response(&mut stream, &response)?;
                        if response.code == "221" {
                            break; // QUIT command
                        }
                    }
                    Err(e) => {
                        let response =
                            SmtpResponse::error(e.to_response_code(), &e.to_response_message());
                        self.send_response(&mut stream, &response)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a line during DATA mode. A lone `.` ends the message and
    /// triggers relay hand-off; `..` unstuffs to `.` per RFC 5321.
    fn handle_data_line(
        &self,
        line: &str,
        session: &mut SmtpSession,
    ) -> Result<Option<SmtpResponse>, SmtpError> {
        if line == "." {
            return Ok(Some(self.finish_message(session)));
        }

        let line = line.strip_prefix('.').unwrap_or(line);
        session.add_data_line(line.to_string())?;
        Ok(None)
    }

    /// Rewrite the buffered message per accepted expression and hand the
    /// batch to the relay dispatcher.
    fn finish_message(&self, session: &mut SmtpSession) -> SmtpResponse {
        let transaction = match session.finish_data() {
            Ok(transaction) => transaction,
            Err(e) => return SmtpResponse::error(e.to_response_code(), &e.to_response_message()),
        };

        let from = message::from_header(&transaction.data)
            .unwrap_or(&transaction.sender)
            .to_string();
        info!(
            "message from {from} for {} expression(s)",
            transaction.recipients.len(),
        );

        let domain = &self.config.incoming.domain;
        let deliveries: Vec<Delivery> = transaction
            .recipients
            .iter()
            .map(|recipient| Delivery {
                addresses: recipient.addresses.clone(),
                message: message::rewrite(
                    &transaction.data,
                    &recipient.tag,
                    &recipient.local_part,
                    domain,
                ),
            })
            .collect();

        match self.relay.dispatch(deliveries) {
            Ok(()) => SmtpResponse::queued(),
            Err(e) => {
                error!("relay hand-off failed: {e}");
                SmtpResponse::transient("Local error, try again later")
            }
        }
    }

    fn peer_allowed(&self, ip: IpAddr) -> bool {
        match &self.accept_from {
            Some(cidrs) => cidrs.iter().any(|cidr| cidr.contains(&ip)),
            None => true,
        }
    }

    /// Send a response to the client
    fn send_response(
        &self,
        stream: &mut TcpStream,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        // Ensure response doesn't exceed maximum line length
        let formatted = response.format();
        if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
            // Truncate message if too long
            let truncated_response =
                SmtpResponse::new(&response.code, "Response too long (truncated)");
            stream.write_all(truncated_response.format().as_bytes())?;
        } else {
            stream.write_all(formatted.as_bytes())?;
        }
        stream.flush()?;
        Ok(())
    }
}
