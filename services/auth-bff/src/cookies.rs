// Refresh-token cookie lifecycle

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::CookieConfig;

/// Builds the refresh-token cookie:
/// `refreshToken=<v>; Path=/auth; HttpOnly; Secure; SameSite=Strict;
/// Max-Age=86400`. The token never appears in a response body; this cookie
/// is its only delivery channel.
pub fn refresh_cookie(config: &CookieConfig, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.name.clone(), value);
    cookie.set_path(config.path.clone());
    cookie.set_http_only(true);
    cookie.set_secure(config.secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(Duration::seconds(config.max_age_seconds));
    if let Some(domain) = &config.domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

/// Clearing variant: same attributes, empty value, Max-Age=0.
pub fn clear_refresh_cookie(config: &CookieConfig) -> Cookie<'static> {
    let mut cookie = refresh_cookie(config, String::new());
    cookie.set_max_age(Duration::ZERO);
    cookie
}
