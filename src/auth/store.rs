//! Access cookie and access token bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::debug;

/// Length of generated cookie and token values.
pub const TOKEN_LENGTH: usize = 20;

/// Default validity of an access cookie (1 hour).
pub const DEFAULT_ACCESS_COOKIE_LIFETIME: Duration = Duration::from_secs(3600);

/// Default validity of an access token.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(10);

/// Accepted lateness after a lifetime ends.
const GRACE: Duration = Duration::from_secs(1);

/// Outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Age {
    Valid,
    Expired,
    Evict,
}

fn classify(issued: Instant, now: Instant, lifetime: Duration) -> Age {
    let age = now.saturating_duration_since(issued);
    if age > lifetime * 2 {
        Age::Evict
    } else if age <= lifetime + GRACE {
        Age::Valid
    } else {
        Age::Expired
    }
}

/// Random `[A-Za-z0-9]` string from the OS generator.
fn random_string(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// The in-memory maps of issued access cookies and tokens.
///
/// Expired entries are removed lazily when they are looked up.
#[derive(Debug)]
pub struct AccessStore {
    cookies: Mutex<HashMap<String, Instant>>,
    tokens: Mutex<HashMap<String, (String, Instant)>>,
    cookie_lifetime: Duration,
    token_lifetime: Duration,
}

impl Default for AccessStore {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESS_COOKIE_LIFETIME, DEFAULT_ACCESS_TOKEN_LIFETIME)
    }
}

impl AccessStore {
    pub fn new(cookie_lifetime: Duration, token_lifetime: Duration) -> Self {
        Self {
            cookies: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            cookie_lifetime,
            token_lifetime,
        }
    }

    pub fn cookie_lifetime(&self) -> Duration {
        self.cookie_lifetime
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    /// Issue a new access cookie.
    pub fn issue_cookie(&self) -> String {
        self.issue_cookie_at(Instant::now())
    }

    pub(crate) fn issue_cookie_at(&self, now: Instant) -> String {
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        let cookie = loop {
            let candidate = random_string(TOKEN_LENGTH);
            if !cookies.contains_key(&candidate) {
                break candidate;
            }
        };
        cookies.insert(cookie.clone(), now);
        debug!("issued access cookie");
        cookie
    }

    /// Issue an access token bound to an access cookie.
    pub fn issue_token(&self, cookie: &str) -> String {
        self.issue_token_at(cookie, Instant::now())
    }

    pub(crate) fn issue_token_at(&self, cookie: &str, now: Instant) -> String {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let token = loop {
            let candidate = random_string(TOKEN_LENGTH);
            if !tokens.contains_key(&candidate) {
                break candidate;
            }
        };
        tokens.insert(token.clone(), (cookie.to_string(), now));
        debug!("issued access token");
        token
    }

    /// Whether an access cookie is known and current.
    pub fn cookie_valid(&self, cookie: &str) -> bool {
        self.cookie_valid_at(cookie, Instant::now())
    }

    pub(crate) fn cookie_valid_at(&self, cookie: &str, now: Instant) -> bool {
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        let Some(issued) = cookies.get(cookie).copied() else {
            return false;
        };
        match classify(issued, now, self.cookie_lifetime) {
            Age::Valid => true,
            Age::Expired => false,
            Age::Evict => {
                cookies.remove(cookie);
                false
            }
        }
    }

    /// Whether an access token is known and current.
    pub fn token_valid(&self, token: &str) -> bool {
        self.token_valid_at(token, Instant::now())
    }

    pub(crate) fn token_valid_at(&self, token: &str, now: Instant) -> bool {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let Some(issued) = tokens.get(token).map(|(_, issued)| *issued) else {
            return false;
        };
        match classify(issued, now, self.token_lifetime) {
            Age::Valid => true,
            Age::Expired => false,
            Age::Evict => {
                tokens.remove(token);
                false
            }
        }
    }

    /// Forget an access cookie and the tokens bound to it.
    pub fn revoke_cookie(&self, cookie: &str) {
        self.cookies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(cookie);
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, (bound, _)| bound != cookie);
    }

    /// Number of cookies and tokens currently held.
    pub fn counts(&self) -> (usize, usize) {
        let cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner()).len();
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner()).len();
        (cookies, tokens)
    }
}
