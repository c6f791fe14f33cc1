use std::net::SocketAddr;

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde_json::Value;

pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";
const DEFAULT_TIMEZONE: &str = "Europe/Paris";
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3600;
const DEFAULT_STALE_AFTER_HOURS: i64 = 24;
const DEFAULT_ALLOCATOR_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    pub interval_secs: u64,
    pub stale_after_hours: i64,
}

/// Typed view of the effective config. Absent keys take defaults.
///
/// ```yaml
/// calendar:
///   timezone: Europe/Paris
/// scanner:
///   interval_secs: 3600
///   stale_after_hours: 24
/// allocator:
///   max_attempts: 5
/// dispatch:
///   webhook_url_env: PODESK_WEBHOOK_URL
/// daemon:
///   addr: 127.0.0.1:8899
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskConfig {
    pub timezone: Tz,
    pub scanner: ScannerConfig,
    pub allocator_max_attempts: u32,
    /// Name of the env var holding the webhook URL, not the URL.
    pub webhook_url_env: Option<String>,
    pub daemon_addr: SocketAddr,
}

impl DeskConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let tz_name =
            str_at(v, "/calendar/timezone")?.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = tz_name
            .parse()
            .map_err(|e| anyhow!("calendar.timezone '{tz_name}' is not an IANA zone: {e}"))?;

        let interval_secs =
            u64_at(v, "/scanner/interval_secs")?.unwrap_or(DEFAULT_SCAN_INTERVAL_SECS);
        if interval_secs == 0 {
            bail!("scanner.interval_secs must be > 0");
        }

        let stale_after_hours = match u64_at(v, "/scanner/stale_after_hours")? {
            Some(h) => i64::try_from(h).context("scanner.stale_after_hours out of range")?,
            None => DEFAULT_STALE_AFTER_HOURS,
        };
        if stale_after_hours == 0 {
            bail!("scanner.stale_after_hours must be > 0");
        }

        let allocator_max_attempts = match u64_at(v, "/allocator/max_attempts")? {
            Some(n) => u32::try_from(n).context("allocator.max_attempts out of range")?,
            None => DEFAULT_ALLOCATOR_MAX_ATTEMPTS,
        };
        if allocator_max_attempts == 0 {
            bail!("allocator.max_attempts must be > 0");
        }

        let webhook_url_env = str_at(v, "/dispatch/webhook_url_env")?;

        let addr = str_at(v, "/daemon/addr")?.unwrap_or_else(|| DEFAULT_DAEMON_ADDR.to_string());
        let daemon_addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("daemon.addr '{addr}' is not a socket address"))?;

        Ok(Self {
            timezone,
            scanner: ScannerConfig {
                interval_secs,
                stale_after_hours,
            },
            allocator_max_attempts,
            webhook_url_env,
            daemon_addr,
        })
    }
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Paris,
            scanner: ScannerConfig {
                interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
                stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
            },
            allocator_max_attempts: DEFAULT_ALLOCATOR_MAX_ATTEMPTS,
            webhook_url_env: None,
            daemon_addr: SocketAddr::from(([127, 0, 0, 1], 8899)),
        }
    }
}

/// Non-blank string at `pointer`; a present non-string value is an error.
fn str_at(v: &Value, pointer: &str) -> Result<Option<String>> {
    match v.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => bail!("{pointer} must be a string, got {other}"),
    }
}

fn u64_at(v: &Value, pointer: &str) -> Result<Option<u64>> {
    match v.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(x) => x
            .as_u64()
            .map(Some)
            .ok_or_else(|| anyhow!("{pointer} must be a non-negative integer, got {x}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_takes_defaults() {
        let c = DeskConfig::from_json(&json!({})).unwrap();
        assert_eq!(c, DeskConfig::default());
        assert_eq!(c.daemon_addr.to_string(), DEFAULT_DAEMON_ADDR);
    }

    #[test]
    fn overrides_are_read() {
        let c = DeskConfig::from_json(&json!({
            "calendar": {"timezone": "UTC"},
            "scanner": {"interval_secs": 60, "stale_after_hours": 48},
            "allocator": {"max_attempts": 3},
            "dispatch": {"webhook_url_env": "DESK_HOOK"},
            "daemon": {"addr": "127.0.0.1:9000"}
        }))
        .unwrap();
        assert_eq!(c.timezone, chrono_tz::UTC);
        assert_eq!(c.scanner.interval_secs, 60);
        assert_eq!(c.scanner.stale_after_hours, 48);
        assert_eq!(c.allocator_max_attempts, 3);
        assert_eq!(c.webhook_url_env.as_deref(), Some("DESK_HOOK"));
        assert_eq!(c.daemon_addr.port(), 9000);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(DeskConfig::from_json(&json!({"calendar": {"timezone": "Mars/Olympus"}})).is_err());
        assert!(DeskConfig::from_json(&json!({"scanner": {"interval_secs": 0}})).is_err());
        assert!(DeskConfig::from_json(&json!({"scanner": {"stale_after_hours": -1}})).is_err());
        assert!(DeskConfig::from_json(&json!({"daemon": {"addr": 8899}})).is_err());
    }
}
