//! Wall clock and caller identity.
//!
//! The service's single time source is `now_ms`. Identity comes from the
//! `x-github-user` / `x-github-username` headers; the service is permissive
//! by default and falls back to `"anonymous"`.

use axum::http::HeaderMap;

pub const ANONYMOUS: &str = "anonymous";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resolved caller identity.
///
/// `user_id` is the stable identity used for lock ownership; `user_name`
/// is display-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        self.user_id == ANONYMOUS
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extract the caller identity from request headers.
///
/// `user_id` prefers `x-github-user` over `x-github-username`; the display
/// name uses the reverse preference. Both fall back to `"anonymous"`.
pub fn identity_from_headers(headers: &HeaderMap) -> Identity {
    let user = header_value(headers, "x-github-user");
    let username = header_value(headers, "x-github-username");

    Identity {
        user_id: user
            .clone()
            .or_else(|| username.clone())
            .unwrap_or_else(|| ANONYMOUS.to_string()),
        user_name: username.or(user).unwrap_or_else(|| ANONYMOUS.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*k).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn prefers_user_header_for_id() {
        let id = identity_from_headers(&headers(&[
            ("x-github-user", "alice"),
            ("x-github-username", "Alice Display"),
        ]));
        assert_eq!(id.user_id, "alice");
        assert_eq!(id.user_name, "Alice Display");
    }

    #[test]
    fn falls_back_to_username_then_anonymous() {
        let id = identity_from_headers(&headers(&[("x-github-username", "bob")]));
        assert_eq!(id.user_id, "bob");
        assert_eq!(id.user_name, "bob");

        let id = identity_from_headers(&headers(&[]));
        assert_eq!(id.user_id, ANONYMOUS);
        assert!(id.is_anonymous());
    }

    #[test]
    fn blank_headers_are_ignored() {
        let id = identity_from_headers(&headers(&[("x-github-user", "   ")]));
        assert!(id.is_anonymous());
    }

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
