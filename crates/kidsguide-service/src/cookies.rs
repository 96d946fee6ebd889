//! Session cookies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};

/// Cookie carrying the access token.
pub const SESSION_COOKIE: &str = "session";

/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Build an HTTP-only cookie that lives until `expires_at`.
#[must_use]
pub fn token_cookie(
    name: &'static str,
    token: String,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    secure: bool,
) -> Cookie<'static> {
    let max_age = (expires_at - now).num_seconds().max(0);
    Cookie::build((name, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(secure)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// Expire both session cookies.
#[must_use]
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// Read a cookie value from the jar.
#[must_use]
pub fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_cookie_has_session_attributes() {
        let now = Utc::now();
        let cookie = token_cookie(SESSION_COOKIE, "abc".into(), now + Duration::hours(1), now, true);

        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(1)));
    }
}
