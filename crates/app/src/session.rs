use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::tap::{StageEvent, StageKind};

pub const SESSION_COOKIE: &str = "acme_session";
pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";
const INVALID_CREDENTIALS: &str = "Invalid credentials.";

/// Signs and verifies HS256 session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    secure_cookie: bool,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl: Duration, secure_cookie: bool) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        // Expiry is checked against the injected clock instead of the system time.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            secure_cookie,
        }
    }

    pub fn issue(&self, subject: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        let issued_at = usize::try_from(now.timestamp()).unwrap_or(0);
        let ttl = usize::try_from(self.ttl.as_secs()).unwrap_or(usize::MAX);
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| SessionError::Invalid(err.to_string()))?
            .claims;
        let expires_at = i64::try_from(claims.exp).unwrap_or(i64::MAX);
        if now.timestamp() >= expires_at {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    fn cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl.as_secs()
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn cleared_cookie(&self) -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign session token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
    #[error("invalid session token: {0}")]
    Invalid(String),
    #[error("session expired")]
    Expired,
}

/// The single administrator account allowed into the dashboard.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

/// Extracts the session token from the request's `Cookie` header.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn has_session(state: &AppState, headers: &HeaderMap) -> bool {
    session_token(headers)
        .map(|token| state.sessions().verify(token, state.now()).is_ok())
        .unwrap_or(false)
}

/// Guards dashboard routes; requests without a valid session go to the login page.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(request.headers()) else {
        return Redirect::to(LOGIN_PATH).into_response();
    };
    match state.sessions().verify(token, state.now()) {
        Ok(claims) => {
            debug!(stage = "auth", user = %claims.sub, "session accepted");
            next.run(request).await
        }
        Err(err) => {
            info!(stage = "auth", error = %err, "rejecting dashboard request");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if has_session(&state, &headers) {
        return Redirect::to(DASHBOARD_PATH).into_response();
    }
    Json(json!({ "title": "Welcome to Acme.", "login": LOGIN_PATH })).into_response()
}

pub async fn login_page() -> Json<serde_json::Value> {
    Json(json!({
        "title": "Please log in to continue.",
        "action": LOGIN_PATH,
        "fields": ["username", "password"],
    }))
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let now = state.now();
    if !state.credentials().matches(&form.username, &form.password) {
        counter!("auth_login_total", "result" => "rejected").increment(1);
        publish_auth(&state, now, "login rejected");
        warn!(stage = "auth", "login rejected");
        return ProblemResponse::new(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            INVALID_CREDENTIALS,
        )
        .into_response();
    }

    let token = match state.sessions().issue(&form.username, now) {
        Ok(token) => token,
        Err(err) => {
            warn!(stage = "auth", error = %err, "failed to issue session");
            return ProblemResponse::internal("session_failed").into_response();
        }
    };

    counter!("auth_login_total", "result" => "success").increment(1);
    publish_auth(&state, now, "login accepted");
    info!(stage = "auth", "login accepted");
    (
        [(header::SET_COOKIE, state.sessions().cookie(&token))],
        Redirect::to(DASHBOARD_PATH),
    )
        .into_response()
}

pub async fn logout(State(state): State<AppState>) -> Response {
    publish_auth(&state, state.now(), "logged out");
    (
        [(header::SET_COOKIE, state.sessions().cleared_cookie())],
        Redirect::to(LOGIN_PATH),
    )
        .into_response()
}

fn publish_auth(state: &AppState, now: DateTime<Utc>, message: &str) {
    if state.tap().has_listeners() {
        state.tap().publish(StageEvent::new(now, StageKind::Auth, message));
    }
}
