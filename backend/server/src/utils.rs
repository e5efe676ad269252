use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use commerce::types::Session;
use time::Duration;

pub const CART_COOKIE: &str = "cartId";
pub const AUTH_COOKIE: &str = "auth_token";
pub const ADMIN_COOKIE: &str = "admin_token";
pub const LOCALE_COOKIE: &str = "locale";

const SESSION_DAYS: i64 = 7;
const LOCALE_DAYS: i64 = 365;

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .build()
}

/// Login cookies (`auth_token`, `admin_token`) last a week.
pub fn session_cookie(
    name: &'static str,
    value: impl Into<String>,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = base_cookie(name, value.into(), secure);
    cookie.set_max_age(Duration::days(SESSION_DAYS));
    cookie
}

/// The cart cookie lives as long as the browser session.
pub fn cart_cookie(cart_id: impl Into<String>, secure: bool) -> Cookie<'static> {
    base_cookie(CART_COOKIE, cart_id.into(), secure)
}

pub fn locale_cookie(locale: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(LOCALE_COOKIE, locale.to_string(), secure);
    cookie.set_http_only(false);
    cookie.set_max_age(Duration::days(LOCALE_DAYS));
    cookie
}

/// Removal cookies must carry the same path the cookie was set with.
pub fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

pub fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_from(jar: &CookieJar) -> Session {
    Session {
        cart_id: cookie_value(jar, CART_COOKIE),
        auth_token: cookie_value(jar, AUTH_COOKIE),
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
