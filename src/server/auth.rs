//! Login, logout and access token endpoints.
//!
//! A browser client goes through these steps:
//!
//! ```text
//! 1. GET {prefix}/login             account cookie (signed), window closes
//! 2. GET {prefix}/token             access cookie and access token
//! 3. GET {prefix}/{id}/info.json    with "Authorization: Bearer {token}"
//! 4. GET {prefix}/{id}/{region}/..  with the access cookie
//! ```
//!
//! Requests that fail the checks in steps 3 and 4 are redirected to the
//! degraded identifier `{id}-deg`, which is always served in gray.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{AccessStore, AccountSigner, AuthDescriptor, AuthError, AuthPattern};
use crate::version::ApiVersion;

use super::handlers::AppState;

/// Page returned by login and logout; closes the popup window.
pub const CLOSE_WINDOW_HTML: &str = "<html><script>window.close();</script></html>";

// =============================================================================
// AuthState
// =============================================================================

/// Auth configuration and bookkeeping for one handler prefix.
#[derive(Debug)]
pub struct AuthState {
    pub pattern: AuthPattern,

    /// Service description; URIs are filled per request by [`descriptor_for`](Self::descriptor_for)
    pub descriptor: AuthDescriptor,

    pub store: AccessStore,

    pub signer: AccountSigner,
}

impl AuthState {
    pub fn new(
        version: ApiVersion,
        pattern: AuthPattern,
        store: AccessStore,
        signer: AccountSigner,
    ) -> Self {
        Self {
            pattern,
            descriptor: AuthDescriptor::new(version).with_pattern(pattern),
            store,
            signer,
        }
    }

    /// Replace the service description, e.g. to fix the cookie prefix.
    pub fn with_descriptor(mut self, descriptor: AuthDescriptor) -> Self {
        self.descriptor = descriptor.with_pattern(self.pattern);
        self
    }

    /// Descriptor with service URIs under `prefix_url`.
    pub fn descriptor_for(&self, prefix_url: &str) -> AuthDescriptor {
        let mut descriptor = self.descriptor.clone();
        descriptor.login_uri = Some(format!("{}/login", prefix_url));
        if self.pattern.has_logout() {
            descriptor.logout_uri = Some(format!("{}/logout", prefix_url));
        }
        descriptor.access_token_uri = Some(format!("{}/token", prefix_url));
        descriptor
    }

    /// Whether the request carries a current access cookie.
    pub fn image_authorized(&self, headers: &HeaderMap) -> bool {
        cookie_value(headers, &self.descriptor.access_cookie_name())
            .is_some_and(|cookie| self.store.cookie_valid(&cookie))
    }

    /// Whether the request carries a current access token.
    pub fn info_authorized(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|token| self.store.token_valid(token))
    }

    /// Check the signed account cookie set by the login service.
    pub fn check_account(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let cookie =
            cookie_value(headers, &self.descriptor.account_cookie_name()).unwrap_or_default();
        let value = self.signer.verify(&cookie)?;
        if value == self.pattern.account_value() {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn account_cookie(&self) -> String {
        set_cookie(
            &self.descriptor.account_cookie_name(),
            &self.signer.sign(self.pattern.account_value()),
            None,
        )
    }
}

// =============================================================================
// Header Helpers
// =============================================================================

/// Token from an `Authorization: Bearer TOKEN` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Value of the cookie `name` from the `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// `(user, password)` from an `Authorization: Basic ...` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = Base64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn set_cookie(name: &str, value: &str, max_age: Option<u64>) -> String {
    match max_age {
        Some(age) => format!("{}={}; Max-Age={}; Path=/", name, value, age),
        None => format!("{}={}; Path=/", name, value),
    }
}

fn expire_cookie(name: &str) -> String {
    format!("{}=; Max-Age=0; Path=/", name)
}

fn auth_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
    cookies: &[String],
) -> Response {
    let mut response = (
        status,
        [
            (header::CONTENT_TYPE, content_type),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response();
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle login requests.
///
/// # Endpoint
///
/// `GET {prefix}/login`
///
/// Clickthrough and kiosk set the account cookie at once. Basic answers
/// `401` with a `WWW-Authenticate` challenge until the user name equals
/// the password. External credentials are obtained elsewhere, so the
/// window just closes.
pub async fn login_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(auth) = state.auth.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match auth.pattern {
        AuthPattern::Clickthrough | AuthPattern::Kiosk => {
            info!(prefix = %state.prefix, pattern = %auth.pattern, "login");
            auth_response(
                StatusCode::OK,
                "text/html",
                CLOSE_WINDOW_HTML.to_string(),
                &[auth.account_cookie()],
            )
        }
        AuthPattern::Basic => match basic_credentials(&headers) {
            Some((user, password)) if user == password => {
                info!(prefix = %state.prefix, user = %user, "basic login");
                auth_response(
                    StatusCode::OK,
                    "text/html",
                    CLOSE_WINDOW_HTML.to_string(),
                    &[auth.account_cookie()],
                )
            }
            _ => {
                debug!(prefix = %state.prefix, "basic login challenge");
                let mut response =
                    auth_response(StatusCode::UNAUTHORIZED, "text/html", String::new(), &[]);
                let realm = format!(
                    "Basic realm=\"HTTP-Basic-Auth at {} (u=p to login)\"",
                    auth.descriptor.name
                );
                if let Ok(value) = HeaderValue::from_str(&realm) {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, value);
                }
                response
            }
        },
        AuthPattern::External => auth_response(
            StatusCode::OK,
            "text/html",
            CLOSE_WINDOW_HTML.to_string(),
            &[],
        ),
    }
}

/// Handle logout requests.
///
/// # Endpoint
///
/// `GET {prefix}/logout`
///
/// Forgets the access cookie and expires both cookies.
pub async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(auth) = state.auth.as_deref().filter(|a| a.pattern.has_logout()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let access_name = auth.descriptor.access_cookie_name();
    if let Some(cookie) = cookie_value(&headers, &access_name) {
        auth.store.revoke_cookie(&cookie);
    }
    info!(prefix = %state.prefix, "logout");
    auth_response(
        StatusCode::OK,
        "text/html",
        CLOSE_WINDOW_HTML.to_string(),
        &[
            expire_cookie(&auth.descriptor.account_cookie_name()),
            expire_cookie(&access_name),
        ],
    )
}

/// Query parameters for token requests.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQueryParams {
    /// Set by browser clients that read the token through `postMessage`
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,

    /// Origin the `postMessage` is addressed to
    pub origin: Option<String>,
}

/// Body of the token service.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TokenResponse {
    Granted {
        #[serde(rename = "accessToken")]
        access_token: String,
        #[serde(rename = "expiresIn")]
        expires_in: u64,
        #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Denied {
        error: &'static str,
        description: String,
        #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

/// HTML page handing the token to the parent window.
fn post_message_page(token: &str, data: &str, origin: &str) -> String {
    let target = serde_json::to_string(origin).unwrap_or_else(|_| "\"*\"".to_string());
    format!(
        "<html>\n<body style=\"margin: 0px;\">\n<div>postMessage ACCESS TOKEN {}</div>\n\
         <script>\nwindow.parent.postMessage({}, {});\n</script>\n</body>\n</html>\n",
        token,
        data.replace('<', "\\u003c"),
        target.replace('<', "\\u003c"),
    )
}

/// Handle access token requests.
///
/// # Endpoint
///
/// `GET {prefix}/token[?messageId=..&origin=..]`
///
/// With a valid account cookie a new access cookie is set and a token
/// bound to it is returned:
///
/// ```json
/// {"accessToken": "...", "expiresIn": 10}
/// ```
///
/// Otherwise `{"error": "missingCredentials", ...}`. With `messageId` the
/// JSON is wrapped in an HTML page that posts it to the parent window.
pub async fn token_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQueryParams>,
    headers: HeaderMap,
) -> Response {
    let Some(auth) = state.auth.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (body, access_cookie) = match auth.check_account(&headers) {
        Ok(()) => {
            let cookie = auth.store.issue_cookie();
            let token = auth.store.issue_token(&cookie);
            info!(prefix = %state.prefix, "issued access token");
            (
                TokenResponse::Granted {
                    access_token: token,
                    expires_in: auth.store.token_lifetime().as_secs(),
                    message_id: query.message_id.clone(),
                },
                Some(cookie),
            )
        }
        Err(e) => {
            debug!(prefix = %state.prefix, error = %e, "token refused");
            (
                TokenResponse::Denied {
                    error: "missingCredentials",
                    description: AuthError::MissingCredentials.to_string(),
                    message_id: query.message_id.clone(),
                },
                None,
            )
        }
    };

    let data = serde_json::to_string(&body).unwrap_or_default();
    let (content_type, payload) = match &query.message_id {
        Some(_) => {
            let token = match &body {
                TokenResponse::Granted { access_token, .. } => access_token.as_str(),
                TokenResponse::Denied { .. } => "",
            };
            let origin = query.origin.as_deref().unwrap_or("unknown_origin");
            ("text/html", post_message_page(token, &data, origin))
        }
        None => ("application/json", data),
    };

    let cookies: Vec<String> = access_cookie
        .map(|cookie| {
            set_cookie(
                &auth.descriptor.access_cookie_name(),
                &cookie,
                Some(auth.store.cookie_lifetime().as_secs()),
            )
        })
        .into_iter()
        .collect();
    auth_response(StatusCode::OK, content_type, payload, &cookies)
}

// =============================================================================
// Tests
// =============================================================================
