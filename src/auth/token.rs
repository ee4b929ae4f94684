//! # 临时令牌工具
//!
//! Copilot 临时令牌形如 `tid=...;exp=1735689600;sku=...`，过期时间只来自 `exp=` 段

use chrono::Utc;

/// 从令牌中提取 `exp=` 段的 unix 秒
///
/// 缺失或无法解析时返回 0，视为已过期
#[must_use]
pub fn extract_expiry(token: &str) -> i64 {
    token
        .split(';')
        .find_map(|segment| segment.trim().strip_prefix("exp="))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

/// `expires_at` 不晚于 `now` 即过期
#[must_use]
pub const fn is_expired(expires_at: i64, now: i64) -> bool {
    expires_at <= now
}

/// 空令牌或已过期令牌均无效
#[must_use]
pub fn is_usable(token: Option<&str>, expires_at: i64, now: i64) -> bool {
    token.is_some_and(|t| !t.is_empty()) && !is_expired(expires_at, now)
}

#[must_use]
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
