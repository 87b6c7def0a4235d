//! In-memory throttle for anonymous demo analyses.
//!
//! Counters live in this process only: they reset on restart and are not
//! shared between replicas.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DemoLimits;

/// Sessions idle for longer than this are dropped by [`DemoRateLimiter::sweep`].
const SESSION_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemoLimitError {
    #[error("Please wait {wait_secs} seconds before next analysis")]
    CooldownActive { wait_secs: u64 },

    /// Same code as `CooldownActive`; raised when the cooldown is first hit.
    #[error("Please wait {wait_secs} seconds between analyses")]
    TooSoon { wait_secs: u64 },

    #[error("Demo session limit reached. Sign up for unlimited analyses!")]
    SessionLimitExceeded { limit: u32 },

    #[error("Daily demo limit reached for this location. Sign up for unlimited access!")]
    IpLimitExceeded { limit: u32 },
}

impl DemoLimitError {
    pub fn code(&self) -> &'static str {
        match self {
            DemoLimitError::CooldownActive { .. } | DemoLimitError::TooSoon { .. } => {
                "COOLDOWN_ACTIVE"
            }
            DemoLimitError::SessionLimitExceeded { .. } => "SESSION_LIMIT_EXCEEDED",
            DemoLimitError::IpLimitExceeded { .. } => "IP_LIMIT_EXCEEDED",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            DemoLimitError::CooldownActive { .. } => {
                "To avoid delays, sign up for unlimited analyses!"
            }
            DemoLimitError::TooSoon { .. } => "Sign up for instant analyses without delays!",
            DemoLimitError::SessionLimitExceeded { .. } => {
                "Create an account to continue analyzing candidates."
            }
            DemoLimitError::IpLimitExceeded { .. } => {
                "Multiple demo sessions detected. Create an account to continue."
            }
        }
    }
}

/// Remaining demo allowance after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoQuota {
    pub session_limit: u32,
    pub session_remaining: u32,
    pub ip_limit: u32,
    pub ip_remaining: u32,
}

#[derive(Debug, Clone)]
struct SessionUsage {
    count: u32,
    last_analysis: DateTime<Utc>,
    cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Stores {
    sessions: HashMap<String, SessionUsage>,
    /// Keyed by `"<ip>:<YYYY-MM-DD>"`.
    ips: HashMap<String, u32>,
}

pub struct DemoRateLimiter {
    limits: DemoLimits,
    cooldown: Duration,
    stores: Mutex<Stores>,
}

impl DemoRateLimiter {
    pub fn new(limits: DemoLimits) -> Self {
        let cooldown =
            Duration::from_std(limits.cooldown).unwrap_or_else(|_| Duration::seconds(30));
        Self {
            limits,
            cooldown,
            stores: Mutex::new(Stores::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Stores> {
        // Counters stay usable even if a holder panicked mid-update.
        self.stores.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admits or rejects one demo analysis for `session_id` from `ip` at `now`,
    /// recording it when admitted.
    pub fn check_and_record(
        &self,
        session_id: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<DemoQuota, DemoLimitError> {
        let ip_key = ip_key(ip, now);
        let mut stores = self.lock();

        let ip_count = stores.ips.get(&ip_key).copied().unwrap_or(0);
        let existing = stores.sessions.get(session_id).cloned();
        let used = existing.as_ref().map_or(0, |u| u.count);

        if let Some(until) = existing.as_ref().and_then(|u| u.cooldown_until) {
            if now < until {
                return Err(DemoLimitError::CooldownActive {
                    wait_secs: ceil_secs(until - now),
                });
            }
        }
        if used >= self.limits.session_limit {
            return Err(DemoLimitError::SessionLimitExceeded {
                limit: self.limits.session_limit,
            });
        }

        if ip_count >= self.limits.ip_daily_limit {
            return Err(DemoLimitError::IpLimitExceeded {
                limit: self.limits.ip_daily_limit,
            });
        }

        if let Some(usage) = existing {
            let elapsed = now - usage.last_analysis;
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                stores.sessions.insert(
                    session_id.to_string(),
                    SessionUsage {
                        cooldown_until: Some(now + remaining),
                        ..usage
                    },
                );
                return Err(DemoLimitError::TooSoon {
                    wait_secs: ceil_secs(remaining),
                });
            }
        }

        let count = used + 1;
        stores.sessions.insert(
            session_id.to_string(),
            SessionUsage {
                count,
                last_analysis: now,
                cooldown_until: None,
            },
        );
        stores.ips.insert(ip_key, ip_count + 1);

        debug!(session_id, ip, count, "Demo analysis admitted");

        Ok(DemoQuota {
            session_limit: self.limits.session_limit,
            session_remaining: self.limits.session_limit.saturating_sub(count),
            ip_limit: self.limits.ip_daily_limit,
            ip_remaining: self.limits.ip_daily_limit.saturating_sub(ip_count + 1),
        })
    }

    /// Current allowance without consuming any of it.
    pub fn peek(&self, session_id: &str, ip: &str, now: DateTime<Utc>) -> DemoQuota {
        let stores = self.lock();
        let used = stores.sessions.get(session_id).map(|u| u.count).unwrap_or(0);
        let ip_used = stores.ips.get(&ip_key(ip, now)).copied().unwrap_or(0);
        DemoQuota {
            session_limit: self.limits.session_limit,
            session_remaining: self.limits.session_limit.saturating_sub(used),
            ip_limit: self.limits.ip_daily_limit,
            ip_remaining: self.limits.ip_daily_limit.saturating_sub(ip_used),
        }
    }

    /// Drops idle sessions and IP counters from previous days.
    /// Returns how many entries were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(SESSION_RETENTION_HOURS);
        let today = day_stamp(now);
        let mut stores = self.lock();

        let before = stores.sessions.len() + stores.ips.len();
        stores.sessions.retain(|_, usage| usage.last_analysis >= cutoff);
        stores
            .ips
            .retain(|key, _| key.rsplit_once(':').map(|(_, day)| day) == Some(today.as_str()));
        let removed = before - (stores.sessions.len() + stores.ips.len());

        if removed > 0 {
            info!("Demo limiter sweep removed {removed} stale entries");
        }
        removed
    }
}

fn day_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn ip_key(ip: &str, now: DateTime<Utc>) -> String {
    format!("{ip}:{}", day_stamp(now))
}

fn ceil_secs(d: Duration) -> u64 {
    let ms = d.num_milliseconds().max(0) as u64;
    ms.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limiter() -> DemoRateLimiter {
        DemoRateLimiter::new(DemoLimits::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_analysis_is_admitted_with_headers_values() {
        let quota = limiter().check_and_record("s1", "10.0.0.1", t0()).unwrap();
        assert_eq!(
            quota,
            DemoQuota {
                session_limit: 2,
                session_remaining: 1,
                ip_limit: 5,
                ip_remaining: 4,
            }
        );
    }

    #[test]
    fn test_second_analysis_within_cooldown_is_rejected() {
        let l = limiter();
        l.check_and_record("s1", "ip", t0()).unwrap();
        let err = l
            .check_and_record("s1", "ip", t0() + Duration::milliseconds(10_500))
            .unwrap_err();
        assert_eq!(err, DemoLimitError::TooSoon { wait_secs: 20 });
        assert_eq!(err.to_string(), "Please wait 20 seconds between analyses");
        assert_eq!(err.hint(), "Sign up for instant analyses without delays!");
    }

    #[test]
    fn test_cooldown_is_remembered_after_rejection() {
        let l = limiter();
        l.check_and_record("s1", "ip", t0()).unwrap();
        l.check_and_record("s1", "ip", t0() + Duration::seconds(5))
            .unwrap_err();
        // Still inside the stored cooldown window.
        let err = l
            .check_and_record("s1", "ip", t0() + Duration::seconds(29))
            .unwrap_err();
        assert_eq!(err, DemoLimitError::CooldownActive { wait_secs: 1 });
        assert_eq!(err.to_string(), "Please wait 1 seconds before next analysis");
    }

    #[test]
    fn test_zero_session_limit_rejects_new_sessions() {
        let l = DemoRateLimiter::new(DemoLimits {
            session_limit: 0,
            ..DemoLimits::default()
        });
        let err = l.check_and_record("fresh", "ip", t0()).unwrap_err();
        assert_eq!(err, DemoLimitError::SessionLimitExceeded { limit: 0 });
        assert_eq!(l.peek("fresh", "ip", t0()).ip_remaining, 5);
    }

    #[test]
    fn test_session_limit_blocks_third_analysis() {
        let l = limiter();
        l.check_and_record("s1", "ip", t0()).unwrap();
        let second = l
            .check_and_record("s1", "ip", t0() + Duration::seconds(31))
            .unwrap();
        assert_eq!(second.session_remaining, 0);
        let err = l
            .check_and_record("s1", "ip", t0() + Duration::seconds(120))
            .unwrap_err();
        assert_eq!(err, DemoLimitError::SessionLimitExceeded { limit: 2 });
    }

    #[test]
    fn test_ip_daily_limit_spans_sessions() {
        let l = limiter();
        for i in 0..5 {
            l.check_and_record(&format!("s{i}"), "1.2.3.4", t0()).unwrap();
        }
        let err = l.check_and_record("fresh", "1.2.3.4", t0()).unwrap_err();
        assert_eq!(err, DemoLimitError::IpLimitExceeded { limit: 5 });

        // Another address is unaffected.
        assert!(l.check_and_record("fresh", "5.6.7.8", t0()).is_ok());
    }

    #[test]
    fn test_ip_limit_resets_next_day() {
        let l = limiter();
        for i in 0..5 {
            l.check_and_record(&format!("s{i}"), "1.2.3.4", t0()).unwrap();
        }
        let tomorrow = t0() + Duration::days(1);
        assert!(l.check_and_record("new", "1.2.3.4", tomorrow).is_ok());
    }

    #[test]
    fn test_rejections_do_not_consume_quota() {
        let l = limiter();
        l.check_and_record("s1", "ip", t0()).unwrap();
        l.check_and_record("s1", "ip", t0() + Duration::seconds(1))
            .unwrap_err();
        let quota = l.peek("s1", "ip", t0());
        assert_eq!(quota.session_remaining, 1);
        assert_eq!(quota.ip_remaining, 4);
    }

    #[test]
    fn test_peek_for_unknown_session_is_full_quota() {
        let quota = limiter().peek("nobody", "ip", t0());
        assert_eq!(quota.session_remaining, 2);
        assert_eq!(quota.ip_remaining, 5);
    }

    #[test]
    fn test_sweep_drops_stale_sessions_and_old_days() {
        let l = limiter();
        l.check_and_record("old", "1.1.1.1", t0()).unwrap();
        let later = t0() + Duration::hours(25);
        l.check_and_record("new", "2.2.2.2", later).unwrap();

        // old session + yesterday's IP key
        assert_eq!(l.sweep(later), 2);
        assert_eq!(l.peek("old", "1.1.1.1", later).session_remaining, 2);
        assert_eq!(l.peek("new", "2.2.2.2", later).session_remaining, 1);
    }

    #[test]
    fn test_sweep_handles_ipv6_keys() {
        let l = limiter();
        l.check_and_record("s", "::1", t0()).unwrap();
        assert_eq!(l.sweep(t0()), 0);
        assert_eq!(l.peek("s", "::1", t0()).ip_remaining, 4);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DemoLimitError::CooldownActive { wait_secs: 1 }.code(),
            "COOLDOWN_ACTIVE"
        );
        assert_eq!(DemoLimitError::TooSoon { wait_secs: 1 }.code(), "COOLDOWN_ACTIVE");
        assert_eq!(
            DemoLimitError::SessionLimitExceeded { limit: 2 }.code(),
            "SESSION_LIMIT_EXCEEDED"
        );
        assert_eq!(
            DemoLimitError::IpLimitExceeded { limit: 5 }.code(),
            "IP_LIMIT_EXCEEDED"
        );
    }
}
