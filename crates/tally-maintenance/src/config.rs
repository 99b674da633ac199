use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tally_db::queries::MIN_CLEANUP_DAYS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub reconcile_interval_secs: u64,
    pub cleanup_days_old: Option<u32>,
    pub cleanup_dry_run: bool,
    pub oneshot: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path: PathBuf = lookup("TALLY_DB_PATH").unwrap_or_else(|| "tally.db".into()).into();

        let reconcile_interval_secs: u64 = lookup("TALLY_RECONCILE_INTERVAL_SECS")
            .unwrap_or_else(|| "3600".into())
            .parse()
            .context("TALLY_RECONCILE_INTERVAL_SECS must be a whole number of seconds")?;
        if reconcile_interval_secs == 0 {
            bail!("TALLY_RECONCILE_INTERVAL_SECS must be greater than zero");
        }

        let cleanup_days_old = match lookup("TALLY_CLEANUP_DAYS_OLD") {
            Some(raw) if !raw.trim().is_empty() => {
                let days: u32 = raw
                    .trim()
                    .parse()
                    .context("TALLY_CLEANUP_DAYS_OLD must be a whole number of days")?;
                if days < MIN_CLEANUP_DAYS {
                    bail!("TALLY_CLEANUP_DAYS_OLD must be at least {}", MIN_CLEANUP_DAYS);
                }
                Some(days)
            }
            _ => None,
        };

        Ok(Self {
            db_path,
            reconcile_interval_secs,
            cleanup_days_old,
            cleanup_dry_run: flag(lookup("TALLY_CLEANUP_DRY_RUN")),
            oneshot: flag(lookup("TALLY_ONESHOT")),
        })
    }
}

fn flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes")
    )
}
