//! Mailbox backend against a scripted IMAP server

use porta_authn::{Authenticator, ImapAuthenticator, ImapSettings};
use porta_core::PortaError;
use porta_net::testutil::{MockServer, Step, TlsFixture};
use porta_net::{connector_with_roots, CertificatePolicy};

fn settings(server: &MockServer, verify: bool) -> ImapSettings {
    ImapSettings {
        server_address: server.address(),
        verify_transport_cert: verify,
        io_timeout_secs: 5,
        logout_timeout_secs: 5,
    }
}

fn plaintext_login(reply: &str) -> Vec<Step> {
    vec![
        Step::send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready"),
        Step::expect("A1 LOGIN user@example.com secret"),
        Step::send(reply),
        Step::expect("A2 LOGOUT"),
        Step::send("* BYE bye"),
        Step::send("A2 OK LOGOUT completed"),
    ]
}

fn starttls_login(fixture: &TlsFixture) -> Vec<Step> {
    vec![
        Step::send("* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready"),
        Step::expect("A1 STARTTLS"),
        Step::send("A1 OK Begin TLS negotiation now"),
        fixture.starttls_step(),
        Step::expect("A2 CAPABILITY"),
        Step::send("* CAPABILITY IMAP4rev1 AUTH=PLAIN"),
        Step::send("A2 OK done"),
        Step::expect("A3 LOGIN user@example.com secret"),
        Step::send("A3 OK logged in"),
        Step::expect("A4 LOGOUT"),
        Step::send("* BYE bye"),
        Step::send("A4 OK LOGOUT completed"),
    ]
}

#[tokio::test]
async fn plaintext_login_succeeds() {
    let server = MockServer::start(plaintext_login("A1 OK LOGIN completed")).await;
    let auth = ImapAuthenticator::new(settings(&server, true)).unwrap();

    auth.verify("user@example.com", "secret").await.unwrap();

    let transcript = server.finish().await;
    assert!(transcript.error.is_none(), "{:?}", transcript.error);
    assert!(!transcript.saw_command("STARTTLS"));
}

#[tokio::test]
async fn rejection_carries_server_text() {
    let script = plaintext_login("A1 NO [AUTHENTICATIONFAILED] Invalid credentials");
    let server = MockServer::start(script).await;
    let auth = ImapAuthenticator::new(settings(&server, true)).unwrap();

    let err = auth.verify("user@example.com", "secret").await.unwrap_err();
    assert!(
        matches!(err, PortaError::AuthenticationFailed(ref text) if text == "Invalid credentials"),
        "{:?}",
        err
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn starttls_with_skip_verify() {
    let fixture = TlsFixture::new("localhost");
    let server = MockServer::start(starttls_login(&fixture)).await;
    let auth = ImapAuthenticator::new(ImapSettings {
        server_address: format!("localhost:{}", server.address().rsplit(':').next().unwrap()),
        ..settings(&server, false)
    })
    .unwrap();

    auth.verify("user@example.com", "secret").await.unwrap();

    let transcript = server.finish().await;
    assert!(transcript.error.is_none(), "{:?}", transcript.error);
}

#[tokio::test]
async fn starttls_with_trusted_root() {
    let fixture = TlsFixture::new("localhost");
    let server = MockServer::start(starttls_login(&fixture)).await;
    let port = server.address().rsplit(':').next().unwrap().to_string();

    let auth = ImapAuthenticator::new(ImapSettings {
        server_address: format!("localhost:{}", port),
        ..settings(&server, true)
    })
    .unwrap()
    .with_connector(connector_with_roots(CertificatePolicy::Verify, fixture.root_store()).unwrap());

    auth.verify("user@example.com", "secret").await.unwrap();
}

#[tokio::test]
async fn failed_upgrade_sends_no_login() {
    let fixture = TlsFixture::new("localhost");
    let server = MockServer::start(starttls_login(&fixture)).await;
    let auth = ImapAuthenticator::new(ImapSettings {
        server_address: format!("localhost:{}", server.address().rsplit(':').next().unwrap()),
        ..settings(&server, true)
    })
    .unwrap();

    let err = auth.verify("user@example.com", "secret").await.unwrap_err();
    assert!(matches!(err, PortaError::Network(_)), "{:?}", err);
    assert!(err.is_retryable());

    let transcript = server.finish().await;
    assert!(!transcript.saw_command("LOGIN"));
}

#[tokio::test]
async fn starttls_refused_is_network_error_without_login() {
    let server = MockServer::start(vec![
        Step::send("* OK [CAPABILITY IMAP4rev1 STARTTLS] ready"),
        Step::expect("A1 STARTTLS"),
        Step::send("A1 NO TLS temporarily unavailable"),
    ])
    .await;
    let auth = ImapAuthenticator::new(settings(&server, true)).unwrap();

    let err = auth.verify("user@example.com", "secret").await.unwrap_err();
    assert!(matches!(err, PortaError::Network(_)), "{:?}", err);
    assert!(err.is_retryable());

    let transcript = server.finish().await;
    assert!(transcript.error.is_none(), "{:?}", transcript.error);
    assert!(!transcript.saw_command("LOGIN"));
}

#[tokio::test]
async fn preauth_greeting_is_not_trusted() {
    let server = MockServer::start(vec![
        Step::send("* PREAUTH [CAPABILITY IMAP4rev1] already logged in"),
        Step::expect("A1 LOGOUT"),
        Step::send("* BYE bye"),
        Step::send("A1 OK LOGOUT completed"),
    ])
    .await;
    let auth = ImapAuthenticator::new(settings(&server, true)).unwrap();

    let err = auth.verify("user@example.com", "secret").await.unwrap_err();
    assert!(matches!(err, PortaError::AuthenticationFailed(_)));

    let transcript = server.finish().await;
    assert!(!transcript.saw_command("LOGIN"));
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let auth = ImapAuthenticator::new(ImapSettings {
        server_address: address,
        verify_transport_cert: true,
        io_timeout_secs: 2,
        logout_timeout_secs: 2,
    })
    .unwrap();

    let err = auth.verify("user@example.com", "secret").await.unwrap_err();
    assert!(matches!(err, PortaError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn logout_failure_does_not_change_outcome() {
    let server = MockServer::start(vec![
        Step::send("* OK [CAPABILITY IMAP4rev1] ready"),
        Step::expect("A1 LOGIN user@example.com secret"),
        Step::send("A1 OK LOGIN completed"),
        Step::expect("A2 LOGOUT"),
        Step::send("A2 BAD no logout for you"),
    ])
    .await;
    let auth = ImapAuthenticator::new(settings(&server, true)).unwrap();

    auth.verify("user@example.com", "secret").await.unwrap();
}

#[tokio::test]
async fn repeated_verify_succeeds() {
    let server = MockServer::start_repeated(plaintext_login("A1 OK LOGIN completed"), 3).await;
    let auth = ImapAuthenticator::new(settings(&server, true)).unwrap();

    for _ in 0..3 {
        auth.verify("user@example.com", "secret").await.unwrap();
    }

    let transcript = server.finish().await;
    assert!(transcript.error.is_none(), "{:?}", transcript.error);
    assert_eq!(transcript.received.iter().filter(|l| l.contains("LOGIN")).count(), 3);
}
