//! Configuration for the token provider.

use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::Duration;

/// Default values.
pub mod defaults {
    use std::time::Duration;

    /// Request token lifetime: 10 minutes.
    pub const REQUEST_TOKEN_LIFETIME_SECS: i64 = 600;

    /// Random bytes per token key and secret (256 bits).
    pub const TOKEN_BYTES: usize = 32;

    /// Random bytes per verifier (160 bits).
    pub const VERIFIER_BYTES: usize = 20;

    /// Cleanup interval: 5 minutes.
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Upper bound for any configured lifetime or interval: 10 years.
    pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;
}

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a request token stays exchangeable.
    pub request_token_lifetime: Duration,

    /// Access token lifetime. `None` issues non-expiring tokens.
    pub access_token_lifetime: Option<Duration>,

    /// Random bytes per token key and secret.
    pub token_bytes: usize,

    /// Random bytes per verifier.
    pub verifier_bytes: usize,

    /// Interval of the background purge task.
    pub cleanup_interval: StdDuration,
}

impl Config {
    #[must_use]
    pub fn new(request_token_lifetime: Duration, access_token_lifetime: Option<Duration>) -> Self {
        Self {
            request_token_lifetime,
            access_token_lifetime,
            token_bytes: defaults::TOKEN_BYTES,
            verifier_bytes: defaults::VERIFIER_BYTES,
            cleanup_interval: defaults::CLEANUP_INTERVAL,
        }
    }

    /// Create a test configuration with short lifetimes.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_token_lifetime: Duration::seconds(30),
            access_token_lifetime: Some(Duration::seconds(60)),
            token_bytes: defaults::TOKEN_BYTES,
            verifier_bytes: defaults::VERIFIER_BYTES,
            cleanup_interval: StdDuration::from_millis(50),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// `OAUTH_ACCESS_TOKEN_LIFETIME_SECS=0` means non-expiring access tokens.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but is not an integer in
    /// `0..=MAX_LIFETIME_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = env_secs("OAUTH_REQUEST_TOKEN_LIFETIME_SECS")? {
            anyhow::ensure!(
                secs > 0,
                "OAUTH_REQUEST_TOKEN_LIFETIME_SECS must be positive"
            );
            config.request_token_lifetime = lifetime("OAUTH_REQUEST_TOKEN_LIFETIME_SECS", secs)?;
        }
        if let Some(secs) = env_secs("OAUTH_ACCESS_TOKEN_LIFETIME_SECS")? {
            config.access_token_lifetime = if secs > 0 {
                Some(lifetime("OAUTH_ACCESS_TOKEN_LIFETIME_SECS", secs)?)
            } else {
                None
            };
        }
        if let Some(secs) = env_secs("OAUTH_CLEANUP_INTERVAL_SECS")? {
            anyhow::ensure!(secs > 0, "OAUTH_CLEANUP_INTERVAL_SECS must be positive");
            config.cleanup_interval = StdDuration::from_secs(secs.unsigned_abs());
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            Duration::seconds(defaults::REQUEST_TOKEN_LIFETIME_SECS),
            None,
        )
    }
}

fn env_secs(name: &str) -> anyhow::Result<Option<i64>> {
    match std::env::var(name) {
        Ok(raw) => parse_secs(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_secs(name: &str, raw: &str) -> anyhow::Result<i64> {
    let secs: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{name} must be an integer"))?;
    anyhow::ensure!(secs >= 0, "{name} must not be negative");
    anyhow::ensure!(
        secs <= defaults::MAX_LIFETIME_SECS,
        "{name} must not exceed {} seconds",
        defaults::MAX_LIFETIME_SECS
    );
    Ok(secs)
}

fn lifetime(name: &str, secs: i64) -> anyhow::Result<Duration> {
    Duration::try_seconds(secs)
        .with_context(|| format!("{name} is out of range"))
}
