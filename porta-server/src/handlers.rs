//! HTTP request handlers

use crate::app::*;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, SERVER, SET_COOKIE};
use hyper::{Method, Request, Response, StatusCode};
use porta_core::auth::{authorize_issuance, IssuanceRequest, SessionState, SESSION_COOKIE};
use porta_core::{Identity, PortaError};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub type ResponseBody = Full<Bytes>;

/// Largest accepted request body
pub const MAX_BODY_SIZE: usize = 64 * 1024;

const SERVER_NAME: &str = concat!("porta/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
enum RequestError {
    #[error(transparent)]
    Porta(#[from] PortaError),

    #[error("request body exceeds {MAX_BODY_SIZE} bytes")]
    BodyTooLarge,

    #[error("unreadable request: {0}")]
    Malformed(String),
}

type HandlerResult = std::result::Result<Response<ResponseBody>, RequestError>;

#[derive(Debug, Default, Deserialize)]
struct AuthenticationQuery {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CertificateForm {
    email: Option<String>,
    public_key: Option<String>,
    cert_duration: Option<String>,
}

/// Main request handler
pub async fn handle_request<B>(
    req: Request<B>,
    app: Arc<App>,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::GET, HEALTH_PATH) => Ok(handle_health()),
        (&Method::GET, BROWSERID_PATH) => handle_support_document(&app),
        (&Method::GET, AUTHENTICATION_PATH) => handle_authentication_status(&req, &app),
        (&Method::POST, AUTHENTICATION_PATH) => handle_login(req, &app).await,
        (&Method::GET, PROVISIONING_PATH) => Ok(handle_provisioning(&req, &app)),
        (&Method::POST, GENERATE_CERTIFICATE_PATH) => handle_generate_certificate(req, &app).await,
        (&Method::GET, IS_AUTHENTICATED_PATH) => Ok(handle_is_authenticated(&req, &app)),
        _ => Ok(json_response(StatusCode::NOT_FOUND, &json!({"error": "Not found"}))),
    };

    let response = result.unwrap_or_else(|e| error_response(&method, &path, e));
    info!("{} {} -> {}", method, path, response.status());
    Ok(response)
}

fn handle_health() -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "service": "porta"
        }),
    )
}

fn handle_support_document(app: &App) -> HandlerResult {
    let document = serde_json::to_value(&app.support).map_err(PortaError::from)?;
    Ok(json_response(StatusCode::OK, &document))
}

/// Report whether the browser is signed in, optionally as a given identity
fn handle_authentication_status<B>(req: &Request<B>, app: &App) -> HandlerResult {
    let query: AuthenticationQuery = serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| RequestError::Malformed(e.to_string()))?;
    let session = read_session(req.headers(), app);

    let (email, authenticated) = match (query.email.filter(|e| !e.is_empty()), session.identity()) {
        (Some(email), Some(proven)) => {
            let authenticated = proven.as_str() == email;
            (Some(email), authenticated)
        }
        (Some(email), None) => (Some(email), false),
        (None, Some(proven)) => (Some(proven.to_string()), true),
        (None, None) => (None, false),
    };

    Ok(json_response(
        StatusCode::OK,
        &json!({"email": email, "authenticated": authenticated}),
    ))
}

/// Check the submitted credentials and record the outcome in the session
async fn handle_login<B>(req: Request<B>, app: &App) -> HandlerResult
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let form: LoginForm = read_form(body).await?;

    let email = form.email.filter(|v| !v.is_empty());
    let password = form.password.filter(|v| !v.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(PortaError::InvalidRequest("'email' and 'password' are required".into()).into());
    };

    let mut session = read_session(&parts.headers, app);
    let outcome = app.authenticator.verify(&email, &password).await;

    let response = match outcome {
        Ok(()) => {
            info!(identity = %email, authenticator = app.authenticator.name(), "User signed in");
            session.sign_in(Identity::new(email.clone()));
            json_response(StatusCode::OK, &json!({"email": email, "authenticated": true}))
        }
        Err(e) => {
            session.sign_out();
            error_response(&parts.method, parts.uri.path(), e.into())
        }
    };

    with_session(response, app, &session)
}

fn handle_provisioning<B>(req: &Request<B>, app: &App) -> Response<ResponseBody> {
    match read_session(req.headers(), app).identity() {
        Some(identity) => json_response(StatusCode::OK, &json!({"authenticated_as": identity})),
        None => json_response(StatusCode::FORBIDDEN, &json!({"error": "Not authenticated"})),
    }
}

/// Sign a certificate for the identity proven by the session
async fn handle_generate_certificate<B>(req: Request<B>, app: &App) -> HandlerResult
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let form: CertificateForm = read_form(body).await?;
    let session = read_session(&parts.headers, app);

    let request = IssuanceRequest::from_fields(
        form.email.as_deref(),
        form.public_key.as_deref(),
        form.cert_duration.as_deref(),
    )?;
    let certificate = authorize_issuance(&session, request)?.issue_with(&app.issuer)?;

    Ok(text_response(StatusCode::OK, certificate.into_token()))
}

fn handle_is_authenticated<B>(req: &Request<B>, app: &App) -> Response<ResponseBody> {
    if read_session(req.headers(), app).is_authenticated() {
        json_response(StatusCode::OK, &json!({"authenticated": true}))
    } else {
        json_response(StatusCode::FORBIDDEN, &json!({"authenticated": false}))
    }
}

async fn read_form<T, B>(body: B) -> std::result::Result<T, RequestError>
where
    T: serde::de::DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = match Limited::new(body, MAX_BODY_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(RequestError::BodyTooLarge)
        }
        Err(e) => return Err(RequestError::Malformed(e.to_string())),
    };

    serde_urlencoded::from_bytes(&bytes).map_err(|e| RequestError::Malformed(e.to_string()))
}

/// Value of the session cookie, if the request carries one
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

fn read_session(headers: &HeaderMap, app: &App) -> SessionState {
    session_cookie(headers)
        .map(|cookie| app.sessions.open(cookie))
        .unwrap_or_default()
}

fn with_session(
    mut response: Response<ResponseBody>,
    app: &App,
    session: &SessionState,
) -> HandlerResult {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        app.sessions.seal(session)?
    );
    let value = HeaderValue::from_str(&cookie).map_err(|e| PortaError::Signing(e.to_string()))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

fn error_response(method: &Method, path: &str, err: RequestError) -> Response<ResponseBody> {
    let (status, message) = match &err {
        RequestError::Porta(PortaError::AuthenticationFailed(_)) => {
            (StatusCode::UNAUTHORIZED, "Authentication failed")
        }
        RequestError::Porta(e) if e.is_retryable() => {
            (StatusCode::SERVICE_UNAVAILABLE, "Authentication backend unavailable")
        }
        RequestError::Porta(PortaError::AuthorizationDenied | PortaError::InvalidRequest(_))
        | RequestError::Malformed(_) => (StatusCode::BAD_REQUEST, "Bad request"),
        RequestError::BodyTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
        RequestError::Porta(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };

    if status.is_server_error() {
        error!("Handler error for {} {}: {}", method, path, err);
    } else {
        warn!("Rejected {} {}: {}", method, path, err);
    }

    json_response(status, &json!({"error": message}))
}

/// JSON response with the standard headers
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<ResponseBody> {
    simple_response(status, "application/json", body.to_string())
}

pub fn text_response(status: StatusCode, body: String) -> Response<ResponseBody> {
    simple_response(status, "text/plain; charset=utf-8", body)
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}
