use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NextTickError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

// ── Re-entry policy ───────────────────────────────────────────

/// What happens to tasks submitted while a flush is draining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReentryPolicy {
    /// Keep them queued and open a fresh batch for them.
    #[default]
    Requeue,
    /// Clear them with the drained batch; they never run.
    Discard,
}

impl fmt::Display for ReentryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReentryPolicy::Requeue => write!(f, "requeue"),
            ReentryPolicy::Discard => write!(f, "discard"),
        }
    }
}

impl FromStr for ReentryPolicy {
    type Err = NextTickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requeue" => Ok(ReentryPolicy::Requeue),
            "discard" => Ok(ReentryPolicy::Discard),
            other => Err(NextTickError::Config(format!(
                "unknown reentry policy '{other}' (expected 'requeue' or 'discard')"
            ))),
        }
    }
}

// ── Scheduler config ──────────────────────────────────────────

pub const DEFAULT_DOMAIN: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    /// Batching domain name, used to tell schedulers apart in logs.
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub reentry: ReentryPolicy,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            domain: default_domain(),
            reentry: ReentryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NEXTTICK_PROFILE`. When set (e.g. `TEST`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NEXTTICK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();

        let reentry = match profiled_env_opt(p, "NEXTTICK_REENTRY") {
            Some(raw) => raw.parse().unwrap_or_else(|e: NextTickError| {
                tracing::warn!(value = %raw, error = %e, "Invalid NEXTTICK_REENTRY, using default");
                ReentryPolicy::default()
            }),
            None => ReentryPolicy::default(),
        };

        Self {
            profile: p.to_string(),
            domain: profiled_env_or(p, "NEXTTICK_DOMAIN", DEFAULT_DOMAIN),
            reentry,
        }
    }

    /// Named domain with default settings.
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn with_reentry(mut self, reentry: ReentryPolicy) -> Self {
        self.reentry = reentry;
        self
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), NextTickError> {
        if self.domain.trim().is_empty() {
            return Err(NextTickError::Config("domain must not be empty".into()));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config loaded (profile: {}):", self.profile_label());
        tracing::info!("  domain:   {}", self.domain);
        tracing::info!("  reentry:  {}", self.reentry);
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "domain": self.domain,
            "reentry": self.reentry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentry_parse() {
        assert_eq!("requeue".parse::<ReentryPolicy>().unwrap(), ReentryPolicy::Requeue);
        assert_eq!(" DISCARD ".parse::<ReentryPolicy>().unwrap(), ReentryPolicy::Discard);
        assert!("drop".parse::<ReentryPolicy>().is_err());
    }

    #[test]
    fn test_reentry_display_roundtrips() {
        for policy in [ReentryPolicy::Requeue, ReentryPolicy::Discard] {
            assert_eq!(policy.to_string().parse::<ReentryPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.domain, "default");
        assert_eq!(config.reentry, ReentryPolicy::Requeue);
        assert_eq!(config.profile_label(), "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_domain_is_invalid() {
        let config = SchedulerConfig::with_domain("  ");
        assert!(matches!(config.validate(), Err(NextTickError::Config(_))));
    }

    // Uses a profile unique to this test so parallel tests never see its vars.
    #[test]
    fn test_profiled_env_lookup() {
        env::set_var("CFGTEST_NEXTTICK_DOMAIN", "ui");
        env::set_var("CFGTEST_NEXTTICK_REENTRY", "discard");
        let config = SchedulerConfig::for_profile("cfgtest");
        assert_eq!(config.profile, "CFGTEST");
        assert_eq!(config.domain, "ui");
        assert_eq!(config.reentry, ReentryPolicy::Discard);
        env::remove_var("CFGTEST_NEXTTICK_DOMAIN");
        env::remove_var("CFGTEST_NEXTTICK_REENTRY");
    }

    #[test]
    fn test_invalid_env_reentry_falls_back() {
        env::set_var("BADREENTRY_NEXTTICK_REENTRY", "sometimes");
        let config = SchedulerConfig::for_profile("badreentry");
        assert_eq!(config.reentry, ReentryPolicy::Requeue);
        env::remove_var("BADREENTRY_NEXTTICK_REENTRY");
    }

    #[test]
    fn test_serde_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{"reentry":"discard"}"#).unwrap();
        assert_eq!(config.domain, "default");
        assert_eq!(config.reentry, ReentryPolicy::Discard);
    }

    #[test]
    fn test_summary() {
        let summary = SchedulerConfig::with_domain("render").summary();
        assert_eq!(summary["domain"], "render");
        assert_eq!(summary["reentry"], "requeue");
    }
}
