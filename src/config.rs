//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
const DEFAULT_CODE_RETRY_LIMIT: u32 = 5;
const DEFAULT_MAX_NAME_CHARS: usize = 40;

/// How phase patches are checked against the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhasePolicy {
    /// Reject patches that do not follow LOBBY → QUESTION → VOTING → RESULTS → QUESTION
    #[default]
    Strict,
    /// Apply whatever fields are present (legacy clients)
    Permissive,
}

impl std::str::FromStr for PhasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(PhasePolicy::Strict),
            "permissive" => Ok(PhasePolicy::Permissive),
            other => Err(format!("unknown phase policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub phase_policy: PhasePolicy,
    /// Optional JSON prompt catalog; the built-in catalog is used otherwise
    pub prompts_file: Option<PathBuf>,
    /// Client polling cadence, advertised to clients
    pub poll_interval: Duration,
    /// Attempts at generating a fresh join code or player handle
    pub code_retry_limit: u32,
    pub max_name_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            phase_policy: PhasePolicy::Strict,
            prompts_file: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            code_retry_limit: DEFAULT_CODE_RETRY_LIMIT,
            max_name_chars: DEFAULT_MAX_NAME_CHARS,
        }
    }
}

/// Parse an env var, warning and falling back to the default on bad input
fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Invalid {}={:?} ({}), using default", key, raw, e);
                default
            }
        },
        _ => default,
    }
}

impl ServerConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let addr = env_or("MOSTLIKELY_ADDR", defaults.addr);
        let phase_policy = env_or("PHASE_POLICY", defaults.phase_policy);
        if phase_policy == PhasePolicy::Permissive {
            tracing::warn!("PHASE_POLICY=permissive - phase patches are not validated");
        }

        let prompts_file = std::env::var("PROMPTS_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let poll_ms = env_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS).max(100);
        let code_retry_limit = env_or("CODE_RETRY_LIMIT", defaults.code_retry_limit).max(1);
        let max_name_chars = env_or("MAX_NAME_CHARS", defaults.max_name_chars).max(1);

        Self {
            addr,
            phase_policy,
            prompts_file,
            poll_interval: Duration::from_millis(poll_ms),
            code_retry_limit,
            max_name_chars,
        }
    }
}
