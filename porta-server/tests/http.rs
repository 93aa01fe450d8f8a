//! End-to-end flow over a real socket: sign in, provision, certify

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use porta_authn::Registry;
use porta_core::auth::Certificate;
use porta_core::test_utils::{self, SHARED_SECRET};
use porta_core::PortaConfig;
use porta_server::{
    App, PortaServer, AUTHENTICATION_PATH, GENERATE_CERTIFICATE_PATH, PROVISIONING_PATH,
};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

const USER: &str = "alice@test.example.com";

struct Reply {
    status: StatusCode,
    set_cookie: Option<String>,
    body: String,
}

async fn start() -> SocketAddr {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("porta.toml");
    std::fs::write(&path, test_utils::config_toml("static", "")).unwrap();

    let config = PortaConfig::load(&path).unwrap();
    let app = App::from_config(&config, &Registry::builtin()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(PortaServer::new(app).serve_listener(listener));
    addr
}

async fn send(
    addr: SocketAddr,
    method: Method,
    path: &str,
    cookie: Option<&str>,
    body: String,
) -> Reply {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(conn);

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("host", addr.to_string())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }

    let response = sender
        .send_request(builder.body(Full::new(Bytes::from(body))).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();

    Reply {
        status,
        set_cookie,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

#[tokio::test]
async fn sign_in_then_certify() {
    let addr = start().await;

    let reply = send(addr, Method::GET, PROVISIONING_PATH, None, String::new()).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let login =
        serde_urlencoded::to_string(&[("email", USER), ("password", SHARED_SECRET)]).unwrap();
    let reply = send(addr, Method::POST, AUTHENTICATION_PATH, None, login).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cookie = reply.set_cookie.expect("session cookie");

    let reply = send(addr, Method::GET, PROVISIONING_PATH, Some(&cookie), String::new()).await;
    assert_eq!(reply.status, StatusCode::OK);

    let request = serde_urlencoded::to_string(&[
        ("email", USER),
        ("public_key", r#"{"algorithm":"DS","y":"1","p":"2","q":"3","g":"4"}"#),
        ("cert_duration", "600"),
    ])
    .unwrap();
    let reply = send(addr, Method::POST, GENERATE_CERTIFICATE_PATH, Some(&cookie), request).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let certificate = Certificate::parse(&reply.body, &test_utils::public_key()).unwrap();
    let claims = certificate.claims();
    assert_eq!(claims.principal.email, USER);
    assert_eq!(claims.exp - claims.iat, 610_000);
    assert_eq!(claims.public_key.algorithm(), Some("DS"));
}

#[tokio::test]
async fn wrong_password_gets_no_session() {
    let addr = start().await;

    let login = serde_urlencoded::to_string(&[("email", USER), ("password", "guess")]).unwrap();
    let reply = send(addr, Method::POST, AUTHENTICATION_PATH, None, login).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let cookie = reply.set_cookie.expect("cleared session cookie");
    let reply = send(addr, Method::GET, PROVISIONING_PATH, Some(&cookie), String::new()).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_over_the_wire() {
    let addr = start().await;
    let reply = send(addr, Method::GET, "/health", None, String::new()).await;
    assert_eq!(reply.status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
