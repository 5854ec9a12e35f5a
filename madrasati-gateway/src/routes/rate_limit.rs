use chrono::{DateTime, Utc};

use madrasati_shared::clients::redis::RedisClient;
use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::types::auth::{AuthUser, UserRole};

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub per_minute: u64,
    pub per_hour: u64,
}

/// Parents get the standard tier; school and super admins the staff tier.
pub fn limits_for(role: UserRole, config: &AppConfig) -> Limits {
    if role.is_staff() {
        Limits { per_minute: config.staff_rpm, per_hour: config.staff_rph }
    } else {
        Limits { per_minute: config.parent_rpm, per_hour: config.parent_rph }
    }
}

/// Fixed-window keys for `user_id`:
/// - per-minute: `rl:{user_id}:min:{YYYYMMDDHHMM}`
/// - per-hour:   `rl:{user_id}:hr:{YYYYMMDDHH}`
pub fn window_keys(user_id: i64, now: DateTime<Utc>) -> (String, String) {
    (
        format!("rl:{}:min:{}", user_id, now.format("%Y%m%d%H%M")),
        format!("rl:{}:hr:{}", user_id, now.format("%Y%m%d%H")),
    )
}

/// Counts the request against both windows. Redis failures let the request
/// through.
pub async fn check_rate_limit(redis: &RedisClient, user: &AuthUser, config: &AppConfig) -> AppResult<()> {
    let limits = limits_for(user.role, config);
    let (minute_key, hour_key) = window_keys(user.id, Utc::now());

    for (key, limit, window) in [(minute_key, limits.per_minute, 60), (hour_key, limits.per_hour, 3600)] {
        match redis.rate_limit_check(&key, limit, window).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id = user.id, role = %user.role, key = %key, "rate limit exceeded");
                metrics::counter!("gateway_rate_limited_total", "role" => user.role.as_str()).increment(1);
                return Err(AppError::new(ErrorCode::RateLimited, "too many requests, try again later"));
            }
            Err(e) => {
                tracing::error!(error = %e, key = %key, "rate limit check failed, allowing request");
                return Ok(());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn staff_get_the_higher_tier() {
        let config = AppConfig::default();
        assert_eq!(
            limits_for(UserRole::Parent, &config),
            Limits { per_minute: config.parent_rpm, per_hour: config.parent_rph }
        );
        for role in [UserRole::SchoolAdmin, UserRole::SuperAdmin] {
            let limits = limits_for(role, &config);
            assert_eq!(limits.per_minute, config.staff_rpm);
            assert!(limits.per_minute > config.parent_rpm);
        }
    }

    #[test]
    fn keys_follow_the_clock_windows() {
        let now = Utc.with_ymd_and_hms(2024, 9, 14, 8, 5, 59).unwrap();
        let (minute, hour) = window_keys(42, now);
        assert_eq!(minute, "rl:42:min:202409140805");
        assert_eq!(hour, "rl:42:hr:2024091408");
    }
}
