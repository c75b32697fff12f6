//! Client configuration: credentials and API host.

use std::env;
use std::fmt;

/// Production API host.
pub const DEFAULT_API_HOST: &str = "https://api.domo.com";

pub const CLIENT_ID_VAR: &str = "DOMO_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "DOMO_CLIENT_SECRET";
pub const API_HOST_VAR: &str = "DOMO_API_HOST";

/// OAuth client credentials.
///
/// Nothing is validated at construction; emptiness is checked when a token is
/// requested.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read `DOMO_CLIENT_ID` / `DOMO_CLIENT_SECRET`. Unset variables become
    /// empty strings and are rejected at authentication time.
    pub fn from_env() -> Self {
        Self::new(
            env::var(CLIENT_ID_VAR).unwrap_or_default(),
            env::var(CLIENT_SECRET_VAR).unwrap_or_default(),
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// API host from `DOMO_API_HOST`, falling back to `DEFAULT_API_HOST`.
pub fn api_host_from_env() -> String {
    env::var(API_HOST_VAR)
        .ok()
        .filter(|host| !host.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_HOST.to_string())
}

/// Held by tests that mutate the process environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness_requires_both_fields() {
        assert!(Credentials::new("id", "secret").is_complete());
        assert!(!Credentials::new("", "secret").is_complete());
        assert!(!Credentials::new("id", "").is_complete());
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", Credentials::new("id", "hunter2"));
        assert!(rendered.contains("id"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn env_loading() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let saved: Vec<_> = [CLIENT_ID_VAR, CLIENT_SECRET_VAR, API_HOST_VAR]
            .iter()
            .map(|var| (*var, env::var(var).ok()))
            .collect();

        env::remove_var(CLIENT_ID_VAR);
        env::remove_var(CLIENT_SECRET_VAR);
        env::remove_var(API_HOST_VAR);
        let credentials = Credentials::from_env();
        assert_eq!(credentials.client_id(), "");
        assert!(!credentials.is_complete());
        assert_eq!(api_host_from_env(), DEFAULT_API_HOST);

        env::set_var(API_HOST_VAR, "   ");
        assert_eq!(api_host_from_env(), DEFAULT_API_HOST);

        env::set_var(CLIENT_ID_VAR, "env-id");
        env::set_var(CLIENT_SECRET_VAR, "env-secret");
        env::set_var(API_HOST_VAR, "http://localhost:8080/");
        assert_eq!(Credentials::from_env(), Credentials::new("env-id", "env-secret"));
        assert_eq!(api_host_from_env(), "http://localhost:8080/");

        for (var, value) in saved {
            match value {
                Some(value) => env::set_var(var, value),
                None => env::remove_var(var),
            }
        }
    }
}
