//! Client configuration loaded from environment variables.
//!
//! All settings default to the application's shipped limits so the client
//! runs with zero configuration.

use palaver_shared::constants::{
    MAX_AVATAR_BYTES, MESSAGE_HISTORY_LIMIT, MIN_PASSWORD_LEN, MIN_SEARCH_TERM_LEN,
    MIN_USERNAME_LEN,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Human-readable name for this deployment.
    /// Env: `PALAVER_INSTANCE_NAME`
    pub instance_name: String,

    /// How many trailing messages a conversation watch replays.
    /// Env: `PALAVER_MESSAGE_HISTORY_LIMIT`
    pub message_history_limit: usize,

    /// Search terms shorter than this return no results.
    /// Env: `PALAVER_MIN_SEARCH_TERM_LEN`
    pub min_search_term_len: usize,

    /// Minimum username length accepted at signup.
    /// Env: `PALAVER_MIN_USERNAME_LEN`
    pub min_username_len: usize,

    /// Minimum password length accepted at signup / password change.
    /// Env: `PALAVER_MIN_PASSWORD_LEN`
    pub min_password_len: usize,

    /// Profile picture size cap in bytes.
    /// Env: `PALAVER_MAX_AVATAR_BYTES`
    pub max_avatar_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            instance_name: "Palaver".to_string(),
            message_history_limit: MESSAGE_HISTORY_LIMIT,
            min_search_term_len: MIN_SEARCH_TERM_LEN,
            min_username_len: MIN_USERNAME_LEN,
            min_password_len: MIN_PASSWORD_LEN,
            max_avatar_bytes: MAX_AVATAR_BYTES,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on missing or unparseable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("PALAVER_INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        read_usize("PALAVER_MESSAGE_HISTORY_LIMIT", &mut config.message_history_limit);
        read_usize("PALAVER_MIN_SEARCH_TERM_LEN", &mut config.min_search_term_len);
        read_usize("PALAVER_MIN_USERNAME_LEN", &mut config.min_username_len);
        read_usize("PALAVER_MIN_PASSWORD_LEN", &mut config.min_password_len);
        read_usize("PALAVER_MAX_AVATAR_BYTES", &mut config.max_avatar_bytes);

        config
    }
}

fn read_usize(var: &str, slot: &mut usize) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => *slot = n,
            _ => tracing::warn!(var, value = %raw, "invalid value, using default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_limits() {
        let config = ClientConfig::default();
        assert_eq!(config.message_history_limit, 100);
        assert_eq!(config.min_search_term_len, 2);
        assert_eq!(config.min_username_len, 3);
        assert_eq!(config.min_password_len, 6);
    }
}
