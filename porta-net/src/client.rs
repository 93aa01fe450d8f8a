//! IMAP client session
//!
//! One [`ImapClient`] drives one connection through greeting, capability
//! discovery, an optional STARTTLS upgrade, `LOGIN` and `LOGOUT`. Every
//! network step is bounded by the client's I/O timeout.

use crate::protocol::{Argument, Capabilities, Response, Status};
use crate::wire::{AsyncStream, Connection};
use crate::{ImapError, Result};
use rustls::pki_types::ServerName;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Connection state as defined by RFC 3501 section 3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotAuthenticated,
    Authenticated,
    Logout,
}

/// Completion of a tagged command
#[derive(Debug)]
struct Completion {
    status: Status,
    text: String,
}

pub struct ImapClient {
    conn: Connection,
    state: SessionState,
    capabilities: Option<Capabilities>,
    encrypted: bool,
    next_tag: u32,
    io_timeout: Duration,
}

impl ImapClient {
    /// Open a TCP connection to `addr` and read the greeting
    pub async fn connect(addr: &str, io_timeout: Duration) -> Result<Self> {
        let stream = bounded("connect", io_timeout, async {
            TcpStream::connect(addr).await.map_err(ImapError::from)
        })
        .await?;
        stream.set_nodelay(true)?;

        Self::from_stream(stream, io_timeout).await
    }

    /// Start a session over an already open stream
    pub async fn from_stream<S: AsyncStream + 'static>(
        stream: S,
        io_timeout: Duration,
    ) -> Result<Self> {
        let mut client = ImapClient {
            conn: Connection::new(Box::new(stream)),
            state: SessionState::NotAuthenticated,
            capabilities: None,
            encrypted: false,
            next_tag: 0,
            io_timeout,
        };

        let greeting = bounded("greeting", io_timeout, client.read_response()).await?;
        client.accept_greeting(greeting)?;
        Ok(client)
    }

    fn accept_greeting(&mut self, greeting: Response) -> Result<()> {
        if let Some(caps) = greeting.capabilities() {
            self.capabilities = Some(caps.clone());
        }

        match greeting {
            Response::Status {
                tag: None,
                status: Status::Ok,
                ..
            } => self.state = SessionState::NotAuthenticated,
            Response::Status {
                tag: None,
                status: Status::PreAuth,
                ..
            } => self.state = SessionState::Authenticated,
            Response::Status {
                tag: None,
                status: Status::Bye,
                text,
                ..
            } => {
                self.state = SessionState::Logout;
                return Err(ImapError::Bye(text));
            }
            other => {
                return Err(ImapError::Protocol(format!("unexpected greeting: {:?}", other)));
            }
        }

        debug!(state = ?self.state, "IMAP greeting received");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Capabilities from the greeting, or from `CAPABILITY` when unknown
    pub async fn capabilities(&mut self) -> Result<&Capabilities> {
        if self.capabilities.is_none() {
            self.capability().await?;
        }

        self.capabilities
            .as_ref()
            .ok_or_else(|| ImapError::Protocol("server did not report capabilities".into()))
    }

    /// Issue `CAPABILITY`, replacing any cached set
    pub async fn capability(&mut self) -> Result<Capabilities> {
        self.capabilities = None;
        let completion =
            bounded("CAPABILITY", self.io_timeout, self.execute("CAPABILITY", &[])).await?;
        expect_ok("CAPABILITY", completion)?;

        self.capabilities
            .clone()
            .ok_or_else(|| ImapError::Protocol("CAPABILITY completed without data".into()))
    }

    /// Upgrade the connection to TLS.
    ///
    /// Consumes the client because the underlying stream is replaced. The
    /// capability cache is cleared; servers may advertise differently once
    /// the channel is encrypted.
    pub async fn starttls(
        mut self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<Self> {
        if self.encrypted {
            return Err(ImapError::Protocol("connection is already encrypted".into()));
        }

        let io_timeout = self.io_timeout;
        let completion = bounded("STARTTLS", io_timeout, self.execute("STARTTLS", &[])).await?;
        expect_ok("STARTTLS", completion)?;

        let ImapClient {
            conn,
            state,
            next_tag,
            ..
        } = self;
        let stream = conn.into_stream()?;

        let tls = bounded("TLS handshake", io_timeout, async {
            connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ImapError::Tls(e.to_string()))
        })
        .await?;

        debug!("STARTTLS negotiated");
        Ok(ImapClient {
            conn: Connection::new(Box::new(tls)),
            state,
            capabilities: None,
            encrypted: true,
            next_tag,
            io_timeout,
        })
    }

    /// Authenticate with `LOGIN`. A tagged `NO` becomes [`ImapError::Rejected`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state != SessionState::NotAuthenticated {
            return Err(ImapError::Protocol(format!("LOGIN not allowed in state {:?}", self.state)));
        }
        if self.capabilities().await?.login_disabled() {
            return Err(ImapError::LoginDisabled);
        }

        let args = [Argument::astring(username), Argument::astring(password)];
        let completion = bounded("LOGIN", self.io_timeout, self.execute("LOGIN", &args)).await?;
        expect_ok("LOGIN", completion)?;

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// End the session with `LOGOUT` and close the stream
    pub async fn logout(&mut self, logout_timeout: Duration) -> Result<()> {
        let result = bounded("LOGOUT", logout_timeout, async {
            match self.execute("LOGOUT", &[]).await {
                Ok(completion) => expect_ok("LOGOUT", completion),
                // Servers may close right after the untagged BYE
                Err(ImapError::Bye(_)) => Ok(()),
                Err(e) => Err(e),
            }
        })
        .await;

        self.state = SessionState::Logout;
        let _ = tokio::time::timeout(logout_timeout, self.conn.shutdown()).await;
        result
    }

    fn tag(&mut self) -> String {
        self.next_tag += 1;
        format!("A{}", self.next_tag)
    }

    async fn read_response(&mut self) -> Result<Response> {
        let line = self.conn.read_line().await?;
        trace!(line = %line, "S:");
        Response::parse(&line)
    }

    /// Send a command and collect responses up to its tagged completion
    async fn execute(&mut self, command: &str, args: &[Argument<'_>]) -> Result<Completion> {
        let tag = self.tag();
        if command == "LOGIN" {
            trace!(tag = %tag, "C: LOGIN <redacted>");
        } else {
            trace!(tag = %tag, command, "C:");
        }

        let mut pending = format!("{} {}", tag, command).into_bytes();
        for arg in args {
            pending.push(b' ');
            match arg {
                Argument::Atom(atom) => pending.extend_from_slice(atom.as_bytes()),
                Argument::Quoted(quoted) => pending.extend_from_slice(quoted.as_bytes()),
                Argument::Literal(bytes) => {
                    pending.extend_from_slice(format!("{{{}}}\r\n", bytes.len()).as_bytes());
                    self.conn.write_all(&pending).await?;
                    self.conn.flush().await?;
                    pending.clear();

                    self.await_continuation(&tag).await?;
                    pending.extend_from_slice(bytes);
                }
            }
        }
        pending.extend_from_slice(b"\r\n");
        self.conn.write_all(&pending).await?;
        self.conn.flush().await?;

        let mut bye = None;
        loop {
            let response = match self.read_response().await {
                Ok(response) => response,
                Err(ImapError::Io(_)) if bye.is_some() => {
                    self.state = SessionState::Logout;
                    return Err(ImapError::Bye(bye.take().unwrap_or_default()));
                }
                Err(e) => return Err(e),
            };

            if let Some(caps) = response.capabilities() {
                self.capabilities = Some(caps.clone());
            }

            match response {
                Response::Status {
                    tag: Some(got),
                    status,
                    text,
                    ..
                } if got == tag => return Ok(Completion { status, text }),
                Response::Status {
                    tag: Some(got), ..
                } => {
                    return Err(ImapError::Protocol(format!(
                        "completion for unknown tag {} while waiting for {}",
                        got, tag
                    )));
                }
                Response::Status {
                    tag: None,
                    status: Status::Bye,
                    text,
                    ..
                } => bye = Some(text),
                _ => {}
            }
        }
    }

    async fn await_continuation(&mut self, tag: &str) -> Result<()> {
        loop {
            match self.read_response().await? {
                Response::Continuation(_) => return Ok(()),
                Response::Status {
                    tag: Some(got),
                    status,
                    text,
                    ..
                } if got == tag => {
                    expect_ok("literal", Completion { status, text })?;
                    return Err(ImapError::Protocol(
                        "command completed before literal was sent".into(),
                    ));
                }
                Response::Status {
                    tag: None,
                    status: Status::Bye,
                    text,
                    ..
                } => return Err(ImapError::Bye(text)),
                _ => {}
            }
        }
    }
}

fn expect_ok(command: &str, completion: Completion) -> Result<()> {
    match completion.status {
        Status::Ok => Ok(()),
        Status::No => Err(ImapError::Rejected(completion.text)),
        status => Err(ImapError::Protocol(format!(
            "{} failed: {} {}",
            command, status, completion.text
        ))),
    }
}

async fn bounded<T>(
    step: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ImapError::Timeout(step, limit))?
}

impl std::fmt::Debug for ImapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapClient")
            .field("state", &self.state)
            .field("encrypted", &self.encrypted)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
