//! Scripted IMAP server for tests
//!
//! A [`MockServer`] accepts TCP connections and plays a script of
//! [`Step`]s against it. Every line the client sends is recorded in the
//! [`Transcript`], including lines sent after the script ran out.

use crate::wire::AsyncStream;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{RootCertStore, ServerConfig};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

#[derive(Clone)]
pub enum Step {
    /// Write a line; CRLF is appended
    Send(String),
    /// Read one line and require it to equal this text
    Expect(String),
    /// Run a TLS server handshake on the connection
    StartTls(Arc<ServerConfig>),
    /// Stop answering and only record what the client sends
    Hang,
    /// Close the connection
    Close,
}

impl Step {
    pub fn send(line: impl Into<String>) -> Self {
        Step::Send(line.into())
    }

    pub fn expect(line: impl Into<String>) -> Self {
        Step::Expect(line.into())
    }
}

/// What the mock server observed
#[derive(Debug, Default)]
pub struct Transcript {
    pub received: Vec<String>,
    pub error: Option<String>,
}

impl Transcript {
    /// Whether any received line contains `command` as its second word
    pub fn saw_command(&self, command: &str) -> bool {
        self.received.iter().any(|line| {
            line.split_whitespace()
                .nth(1)
                .is_some_and(|word| word.eq_ignore_ascii_case(command))
        })
    }
}

pub struct MockServer {
    addr: SocketAddr,
    handle: JoinHandle<Transcript>,
}

impl MockServer {
    pub async fn start(script: Vec<Step>) -> Self {
        Self::start_repeated(script, 1).await
    }

    /// Serve `sessions` consecutive connections, each with the same script
    pub async fn start_repeated(script: Vec<Step>, sessions: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock IMAP server");
        let addr = listener.local_addr().expect("mock server address");

        let handle = tokio::spawn(async move {
            let mut transcript = Transcript::default();
            for _ in 0..sessions {
                let result = match listener.accept().await {
                    Ok((stream, _)) => {
                        play(Box::new(stream), script.clone(), &mut transcript).await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    transcript.error = Some(e.to_string());
                    break;
                }
            }
            transcript
        });

        MockServer { addr, handle }
    }

    /// `host:port` to dial
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the client to disconnect and return the transcript
    pub async fn finish(self) -> Transcript {
        self.handle.await.expect("mock server task panicked")
    }
}

async fn play(
    stream: Box<dyn AsyncStream>,
    script: Vec<Step>,
    transcript: &mut Transcript,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    for step in script {
        match step {
            Step::Send(line) => {
                let stream = reader.get_mut();
                stream.write_all(format!("{}\r\n", line).as_bytes()).await?;
                stream.flush().await?;
            }
            Step::Expect(expected) => {
                let line = read_line(&mut reader).await?.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, format!("expected {:?}", expected))
                })?;
                transcript.received.push(line.clone());
                if line != expected {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("expected {:?}, got {:?}", expected, line),
                    ));
                }
            }
            Step::StartTls(config) => {
                let stream = reader.into_inner();
                let tls = TlsAcceptor::from(config).accept(stream).await?;
                reader = BufReader::new(Box::new(tls));
            }
            Step::Hang => break,
            Step::Close => {
                reader.get_mut().shutdown().await?;
                return Ok(());
            }
        }
    }

    loop {
        match read_line(&mut reader).await {
            Ok(Some(line)) => transcript.received.push(line),
            Ok(None) => return Ok(()),
            // Clients may drop a TLS session without close_notify
            Err(e) if is_disconnect(&e) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
    )
}

async fn read_line(reader: &mut BufReader<Box<dyn AsyncStream>>) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Self-signed server certificate for STARTTLS tests
pub struct TlsFixture {
    pub server_config: Arc<ServerConfig>,
    pub certificate: CertificateDer<'static>,
}

impl TlsFixture {
    pub fn new(host: &str) -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![host.to_string()])
            .expect("generate test certificate");
        let certificate = certified.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
        let key = PrivateKeyDer::Pkcs8(key_der);

        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![certificate.clone()], key)
            .expect("server certificate");

        TlsFixture {
            server_config: Arc::new(config),
            certificate,
        }
    }

    /// Root store trusting only this fixture's certificate
    pub fn root_store(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.certificate.clone()).expect("add fixture root");
        roots
    }

    pub fn starttls_step(&self) -> Step {
        Step::StartTls(self.server_config.clone())
    }
}
