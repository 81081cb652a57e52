//! Per-identity upload cooldown.
//!
//! Nothing is stored: the status is recomputed from the identity's
//! `last_upload_at` on every check.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub allowed: bool,
    /// Zero exactly when `allowed` is true.
    pub remaining: Duration,
}

impl CooldownStatus {
    pub const OPEN: CooldownStatus = CooldownStatus {
        allowed: true,
        remaining: Duration::ZERO,
    };

    /// Remaining time in whole seconds, rounded up.
    pub fn remaining_secs(&self) -> u64 {
        ceil_secs(self.remaining)
    }
}

/// Whether an identity whose last upload was at `last_upload_at` may upload
/// at `now`.
pub fn can_upload(
    last_upload_at: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> CooldownStatus {
    let Some(last) = last_upload_at else {
        return CooldownStatus::OPEN;
    };

    let ready_at = chrono::Duration::from_std(cooldown)
        .ok()
        .and_then(|d| last.checked_add_signed(d));
    // Beyond chrono's range: treat as never expiring.
    let Some(ready_at) = ready_at else {
        return CooldownStatus {
            allowed: false,
            remaining: cooldown,
        };
    };

    match (ready_at - now).to_std() {
        Ok(remaining) if !remaining.is_zero() => CooldownStatus {
            allowed: false,
            remaining,
        },
        // Negative or zero: the cooldown has elapsed.
        _ => CooldownStatus::OPEN,
    }
}

pub fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Human form of a wait: "N minutes" from one minute up, "N seconds" below.
pub fn format_wait(remaining: &Duration) -> String {
    let secs = ceil_secs(*remaining);
    if secs >= 60 {
        let minutes = secs.div_ceil(60);
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    } else if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{secs} seconds")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_never_uploaded() {
        assert_eq!(can_upload(None, HOUR, t0()), CooldownStatus::OPEN);
    }

    #[test]
    fn test_within_cooldown() {
        let status = can_upload(Some(t0()), HOUR, t0() + chrono::Duration::minutes(30));
        assert!(!status.allowed);
        assert_eq!(status.remaining, Duration::from_secs(1800));
        assert_eq!(status.remaining_secs(), 1800);
    }

    #[test]
    fn test_boundary_is_allowed() {
        let status = can_upload(Some(t0()), HOUR, t0() + chrono::Duration::hours(1));
        assert!(status.allowed);
        assert_eq!(status.remaining, Duration::ZERO);
    }

    #[test]
    fn test_subsecond_remaining_rounds_up() {
        let now = t0() + chrono::Duration::milliseconds(3_599_500);
        let status = can_upload(Some(t0()), HOUR, now);
        assert!(!status.allowed);
        assert_eq!(status.remaining_secs(), 1);
    }

    #[test]
    fn test_allowed_flips_once() {
        let mut seen_allowed = false;
        for minute in 0..=120 {
            let status = can_upload(Some(t0()), HOUR, t0() + chrono::Duration::minutes(minute));
            assert_eq!(status.allowed, status.remaining.is_zero());
            if seen_allowed {
                assert!(status.allowed, "became limited again at minute {minute}");
            }
            seen_allowed |= status.allowed;
        }
        assert!(seen_allowed);
    }

    #[test]
    fn test_last_upload_in_future() {
        let status = can_upload(Some(t0() + chrono::Duration::minutes(10)), HOUR, t0());
        assert!(!status.allowed);
        assert_eq!(status.remaining, Duration::from_secs(4200));
    }

    #[test]
    fn test_zero_cooldown() {
        assert!(can_upload(Some(t0()), Duration::ZERO, t0()).allowed);
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(&Duration::from_secs(1800)), "30 minutes");
        assert_eq!(format_wait(&Duration::from_secs(61)), "2 minutes");
        assert_eq!(format_wait(&Duration::from_secs(60)), "1 minute");
        assert_eq!(format_wait(&Duration::from_secs(45)), "45 seconds");
        assert_eq!(format_wait(&Duration::from_millis(200)), "1 second");
    }
}
