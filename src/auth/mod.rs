//! Authentication services.
//!
//! Three pieces cooperate:
//!
//! - [`AuthDescriptor`] builds the `service` block advertised in the info
//!   document (login service with nested logout, client id and token
//!   services)
//! - [`AccessStore`] issues and checks access cookies and access tokens
//! - [`AccountSigner`] signs the account cookie set by the login service
//!
//! The HTTP endpoints that tie these together live in the server module.

mod cookie;
mod store;

pub use cookie::{AccountSigner, AuthError};
pub use store::{
    AccessStore, DEFAULT_ACCESS_COOKIE_LIFETIME, DEFAULT_ACCESS_TOKEN_LIFETIME, TOKEN_LENGTH,
};

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde_json::{json, Map, Value};

use crate::info::ImageInfo;
use crate::version::ApiVersion;

/// Default human readable service name.
pub const DEFAULT_SERVICE_NAME: &str = "image server";

/// Suffix marking the degraded form of an identifier.
pub const DEGRADED_SUFFIX: &str = "-deg";

// =============================================================================
// AuthPattern
// =============================================================================

/// Interaction pattern of the login service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPattern {
    /// User clicks through a terms page
    Clickthrough,

    /// No user interaction; the login window closes immediately
    Kiosk,

    /// Credentials obtained out of band
    External,

    /// HTTP Basic credentials, advertised as the generic login pattern
    Basic,
}

impl AuthPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPattern::Clickthrough => "clickthrough",
            AuthPattern::Kiosk => "kiosk",
            AuthPattern::External => "external",
            AuthPattern::Basic => "basic",
        }
    }

    /// Last segment of the login service profile URI.
    pub fn profile_name(&self) -> &'static str {
        match self {
            AuthPattern::Basic => "login",
            other => other.as_str(),
        }
    }

    /// Whether the pattern offers a logout service.
    pub fn has_logout(&self) -> bool {
        matches!(self, AuthPattern::Basic)
    }

    /// Value stored in the account cookie after login.
    pub fn account_value(&self) -> &'static str {
        match self {
            AuthPattern::Clickthrough => "clickthrough-ok",
            AuthPattern::Kiosk => "kiosk-null-ok",
            AuthPattern::External => "external-ok",
            AuthPattern::Basic => "basic-ok",
        }
    }
}

impl fmt::Display for AuthPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clickthrough" => Ok(AuthPattern::Clickthrough),
            "kiosk" => Ok(AuthPattern::Kiosk),
            "external" => Ok(AuthPattern::External),
            "basic" => Ok(AuthPattern::Basic),
            other => Err(format!("Unknown auth type: {}", other)),
        }
    }
}

/// A six digit random cookie prefix such as `042137_`.
pub fn random_cookie_prefix() -> String {
    format!("{:06}_", rand::thread_rng().gen_range(0..1_000_000u32))
}

/// Base identifier of a degraded identifier, if it is one.
pub fn degraded_base(identifier: &str) -> Option<&str> {
    identifier
        .strip_suffix(DEGRADED_SUFFIX)
        .filter(|base| !base.is_empty())
}

// =============================================================================
// AuthDescriptor
// =============================================================================

/// Description of the auth services of one handler prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthDescriptor {
    pub profile_base: String,
    pub pattern: Option<AuthPattern>,
    pub name: String,
    pub login_uri: Option<String>,
    pub logout_uri: Option<String>,
    pub client_id_uri: Option<String>,
    pub access_token_uri: Option<String>,
    cookie_prefix: String,
}

impl AuthDescriptor {
    /// Descriptor for `version` with a random cookie prefix.
    pub fn new(version: ApiVersion) -> Self {
        Self::with_cookie_prefix(version, random_cookie_prefix())
    }

    pub fn with_cookie_prefix(version: ApiVersion, cookie_prefix: impl Into<String>) -> Self {
        Self {
            profile_base: version
                .profile()
                .auth_profile_base
                .unwrap_or("http://iiif.io/api/image/2/auth/")
                .to_string(),
            pattern: None,
            name: DEFAULT_SERVICE_NAME.to_string(),
            login_uri: None,
            logout_uri: None,
            client_id_uri: None,
            access_token_uri: None,
            cookie_prefix: cookie_prefix.into(),
        }
    }

    pub fn with_pattern(mut self, pattern: AuthPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn cookie_prefix(&self) -> &str {
        &self.cookie_prefix
    }

    /// Name of the cookie set by the login service.
    pub fn account_cookie_name(&self) -> String {
        format!("{}account", self.cookie_prefix)
    }

    /// Name of the cookie that grants image access.
    pub fn access_cookie_name(&self) -> String {
        format!("{}access", self.cookie_prefix)
    }

    fn profile(&self, name: &str) -> String {
        format!("{}{}", self.profile_base, name)
    }

    /// The login service; `None` without a login URI.
    pub fn login_service(&self) -> Option<Value> {
        let login_uri = self.login_uri.as_ref()?;
        let pattern = self.pattern.map(|p| p.profile_name()).unwrap_or("login");

        let mut service = Map::new();
        service.insert("@id".into(), json!(login_uri));
        service.insert("profile".into(), json!(self.profile(pattern)));
        if self.pattern == Some(AuthPattern::External) {
            service.insert("label".into(), json!("External Authentication Required"));
            service.insert("failureHeader".into(), json!("Restricted Material"));
            service.insert(
                "failureDescription".into(),
                json!("This material is not viewable without prior agreement"),
            );
        } else {
            service.insert("label".into(), json!(format!("Login to {}", self.name)));
        }

        let children = self.child_services();
        match children.len() {
            0 => {}
            1 => {
                service.insert("service".into(), children[0].clone());
            }
            _ => {
                service.insert("service".into(), Value::Array(children));
            }
        }
        Some(Value::Object(service))
    }

    /// Logout, client id and token services, in that order.
    fn child_services(&self) -> Vec<Value> {
        let mut children = Vec::new();
        if let Some(uri) = &self.logout_uri {
            children.push(json!({
                "@id": uri,
                "profile": self.profile("logout"),
                "label": format!("Logout from {}", self.name),
            }));
        }
        if let Some(uri) = &self.client_id_uri {
            children.push(json!({"@id": uri, "profile": self.profile("clientId")}));
        }
        if let Some(uri) = &self.access_token_uri {
            children.push(json!({"@id": uri, "profile": self.profile("token")}));
        }
        children
    }

    /// Add the service block to an info document.
    pub fn add_services(&self, info: &mut ImageInfo) {
        if let Some(service) = self.login_service() {
            info.services.push(service);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(version: ApiVersion) -> AuthDescriptor {
        let mut auth = AuthDescriptor::with_cookie_prefix(version, "abc_");
        auth.login_uri = Some("http://example.com/login".into());
        auth
    }

    #[test]
    fn test_defaults() {
        let auth = AuthDescriptor::new(ApiVersion::V2_1);
        assert_eq!(auth.profile_base, "http://iiif.io/api/image/2/auth/");
        assert_eq!(auth.name, "image server");
        let prefix = auth.cookie_prefix();
        assert_eq!(prefix.len(), 7);
        assert!(prefix[..6].chars().all(|c| c.is_ascii_digit()));
        assert!(prefix.ends_with('_'));

        let auth = AuthDescriptor::with_cookie_prefix(ApiVersion::V3_0, "abc_");
        assert_eq!(auth.profile_base, "http://iiif.io/api/auth/1/");
        assert_eq!(auth.account_cookie_name(), "abc_account");
        assert_eq!(auth.access_cookie_name(), "abc_access");
    }

    #[test]
    fn test_nothing_without_login() {
        let mut auth = AuthDescriptor::with_cookie_prefix(ApiVersion::V3_0, "x_");
        auth.logout_uri = Some("http://example.com/logout".into());
        assert_eq!(auth.login_service(), None);

        let mut info = ImageInfo::new(ApiVersion::V3_0).with_identifier("i");
        auth.add_services(&mut info);
        assert!(info.services.is_empty());
    }

    #[test]
    fn test_just_login() {
        let service = descriptor(ApiVersion::V3_0).login_service().unwrap();
        assert_eq!(
            service,
            json!({
                "@id": "http://example.com/login",
                "profile": "http://iiif.io/api/auth/1/login",
                "label": "Login to image server"
            })
        );
    }

    #[test]
    fn test_single_child_is_object() {
        let mut auth = descriptor(ApiVersion::V3_0);
        auth.logout_uri = Some("http://example.com/logout".into());
        let service = auth.login_service().unwrap();
        assert_eq!(
            service["service"],
            json!({
                "@id": "http://example.com/logout",
                "profile": "http://iiif.io/api/auth/1/logout",
                "label": "Logout from image server"
            })
        );

        let mut auth = descriptor(ApiVersion::V3_0);
        auth.access_token_uri = Some("http://example.com/token".into());
        let service = auth.login_service().unwrap();
        assert_eq!(service["service"]["profile"], "http://iiif.io/api/auth/1/token");
    }

    #[test]
    fn test_several_children_form_array() {
        let mut auth = descriptor(ApiVersion::V2_1);
        auth.logout_uri = Some("Zlogout".into());
        auth.client_id_uri = Some("Zclient".into());
        auth.access_token_uri = Some("Ztoken".into());
        let service = auth.login_service().unwrap();
        let ids: Vec<&str> = service["service"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["@id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["Zlogout", "Zclient", "Ztoken"]);
        assert_eq!(
            service["service"][1]["profile"],
            "http://iiif.io/api/image/2/auth/clientId"
        );
    }

    #[test]
    fn test_pattern_profiles() {
        let auth = descriptor(ApiVersion::V3_0).with_pattern(AuthPattern::Kiosk);
        assert_eq!(
            auth.login_service().unwrap()["profile"],
            "http://iiif.io/api/auth/1/kiosk"
        );
        let auth = descriptor(ApiVersion::V3_0).with_pattern(AuthPattern::Basic);
        assert_eq!(
            auth.login_service().unwrap()["profile"],
            "http://iiif.io/api/auth/1/login"
        );
        let auth = descriptor(ApiVersion::V2_1).with_pattern(AuthPattern::External);
        let service = auth.login_service().unwrap();
        assert_eq!(service["label"], "External Authentication Required");
        assert_eq!(service["failureHeader"], "Restricted Material");
    }

    #[test]
    fn test_add_services_to_info() {
        let mut info = ImageInfo::new(ApiVersion::V3_0)
            .with_identifier("http://example.com/i1")
            .with_dimensions(10, 10);
        descriptor(ApiVersion::V3_0).add_services(&mut info);
        let value = info.to_value();
        assert_eq!(value["service"]["@id"], "http://example.com/login");
    }

    #[test]
    fn test_pattern_parse_and_degraded() {
        assert_eq!("kiosk".parse::<AuthPattern>().unwrap(), AuthPattern::Kiosk);
        assert!("google".parse::<AuthPattern>().is_err());
        assert_eq!(degraded_base("id1-deg"), Some("id1"));
        assert_eq!(degraded_base("id1"), None);
        assert_eq!(degraded_base("-deg"), None);
    }
}
