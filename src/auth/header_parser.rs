//! # 客户端认证头解析
//!
//! 解析 `Authorization: Bearer <long-term>`，并校验长期凭证前缀

use crate::error::{ProxyError, Result};

/// 可接受的长期凭证前缀（GitHub 用户/OAuth 令牌）
pub const ACCEPTED_PREFIXES: [&str; 2] = ["ghu", "gho"];

/// 客户端提交的凭证
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentedCredential<'a> {
    /// 未携带 Bearer 凭证
    Absent,
    /// 已校验格式的长期凭证
    Bearer(&'a str),
}

/// 解析 Authorization 头
///
/// 头缺失或不以 `Bearer ` 开头视为未携带凭证；携带但为空或前缀不符时报错
pub fn parse_authorization(header: Option<&str>) -> Result<PresentedCredential<'_>> {
    let Some(value) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
        return Ok(PresentedCredential::Absent);
    };

    let credential = value.trim();
    if credential.is_empty() {
        return Err(ProxyError::unauthorized("Authorization token is empty"));
    }
    if !has_accepted_prefix(credential) {
        return Err(ProxyError::unauthorized("Invalid authorization token format"));
    }

    Ok(PresentedCredential::Bearer(credential))
}

#[must_use]
pub fn has_accepted_prefix(credential: &str) -> bool {
    ACCEPTED_PREFIXES.iter().any(|prefix| credential.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("Basic dXNlcjpwYXNz"))]
    #[case(Some("bearer ghu_lowercase_scheme"))]
    fn test_absent_credentials(#[case] header: Option<&str>) {
        assert_eq!(parse_authorization(header).unwrap(), PresentedCredential::Absent);
    }

    #[rstest]
    #[case("Bearer ghu_abc123", "ghu_abc123")]
    #[case("Bearer gho_abc123", "gho_abc123")]
    #[case("Bearer   ghu_padded  ", "ghu_padded")]
    fn test_bearer_credentials(#[case] header: &str, #[case] expected: &str) {
        assert_eq!(
            parse_authorization(Some(header)).unwrap(),
            PresentedCredential::Bearer(expected)
        );
    }

    #[rstest]
    #[case("Bearer ")]
    #[case("Bearer    ")]
    #[case("Bearer sk-openai-key")]
    #[case("Bearer ghp_personal_access_token")]
    fn test_rejected_credentials(#[case] header: &str) {
        let err = parse_authorization(Some(header)).unwrap_err();
        assert!(matches!(err, ProxyError::Unauthorized { .. }));
    }
}
