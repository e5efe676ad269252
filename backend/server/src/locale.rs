//! # Locale Routing
//!
//! Every storefront path starts with a locale segment (`/en/search`). Requests
//! without one are redirected to the visitor's preferred locale, taken from the
//! `locale` cookie, then `Accept-Language`, then the default.
//!
//! API, admin and static asset paths are never redirected.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State as AxumState},
    http::header::ACCEPT_LANGUAGE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::AppError,
    state::State,
    utils::{LOCALE_COOKIE, cookie_value, locale_cookie},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Locale {
    pub code: &'static str,
    pub name: &'static str,
}

pub const LOCALES: [Locale; 5] = [
    Locale { code: "zh", name: "中文" },
    Locale { code: "en", name: "English" },
    Locale { code: "de", name: "Deutsch" },
    Locale { code: "fr", name: "Français" },
    Locale { code: "it", name: "Italiano" },
];

pub const DEFAULT_LOCALE: Locale = LOCALES[0];

const SKIPPED_PREFIXES: [&str; 4] = ["/api", "/admin", "/static", "/favicon.ico"];

impl Locale {
    pub fn parse(code: &str) -> Option<Locale> {
        LOCALES.iter().copied().find(|locale| locale.code == code)
    }

    pub fn is_default(&self) -> bool {
        *self == DEFAULT_LOCALE
    }
}

/// The locale named by the first path segment, if any.
pub fn locale_prefix(path: &str) -> Option<Locale> {
    path.split('/')
        .find(|segment| !segment.is_empty())
        .and_then(Locale::parse)
}

pub fn locale_from_path(path: &str) -> Locale {
    locale_prefix(path).unwrap_or(DEFAULT_LOCALE)
}

pub fn remove_locale_from_path(path: &str) -> String {
    if locale_prefix(path).is_none() {
        return path.to_string();
    }

    let rest: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .skip(1)
        .collect();

    format!("/{}", rest.join("/"))
}

/// The default locale is served without a prefix.
pub fn add_locale_to_path(path: &str, locale: Locale) -> String {
    let bare = remove_locale_from_path(path);

    if locale.is_default() {
        bare
    } else if bare == "/" {
        format!("/{}", locale.code)
    } else {
        format!("/{}{bare}", locale.code)
    }
}

/// Highest-quality `Accept-Language` entry whose primary subtag is supported.
pub fn preferred_locale(accept_language: &str) -> Option<Locale> {
    let mut languages: Vec<(&str, f32)> = accept_language
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split(";q=");
            let tag = parts.next()?.trim();
            let quality = parts
                .next()
                .and_then(|q| q.trim().parse().ok())
                .unwrap_or(1.0);
            let primary = tag.split('-').next()?;

            Some((primary, quality))
        })
        .collect();

    languages.sort_by(|a, b| b.1.total_cmp(&a.1));

    languages
        .into_iter()
        .find_map(|(code, _)| Locale::parse(&code.to_ascii_lowercase()))
}

pub fn negotiate(cookie: Option<&str>, accept_language: Option<&str>) -> Locale {
    cookie
        .and_then(Locale::parse)
        .or_else(|| accept_language.and_then(preferred_locale))
        .unwrap_or(DEFAULT_LOCALE)
}

fn is_skipped(path: &str) -> bool {
    SKIPPED_PREFIXES.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }) || path
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'))
}

pub async fn locale_middleware(mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if is_skipped(&path) {
        return next.run(request).await;
    }

    if let Some(locale) = locale_prefix(&path) {
        request.extensions_mut().insert(locale);
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let accept_language = request
        .headers()
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    let locale = negotiate(cookie_value(&jar, LOCALE_COOKIE).as_deref(), accept_language);

    let mut target = if path == "/" {
        format!("/{}", locale.code)
    } else {
        format!("/{}{path}", locale.code)
    };
    if let Some(query) = request.uri().query() {
        target = format!("{target}?{query}");
    }

    debug!("Redirecting {path} to {target}");
    Redirect::temporary(&target).into_response()
}

pub async fn locales_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "locales": LOCALES,
        "defaultLocale": DEFAULT_LOCALE.code,
    }))
}

#[derive(Deserialize)]
pub struct LocaleSwitch {
    locale: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Serialize)]
pub struct LocaleSwitched {
    locale: &'static str,
    path: String,
}

pub async fn switch_locale_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(payload): Json<LocaleSwitch>,
) -> Result<(CookieJar, Json<LocaleSwitched>), AppError> {
    let locale = Locale::parse(&payload.locale)
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported locale: {}", payload.locale)))?;
    let path = add_locale_to_path(payload.path.as_deref().unwrap_or("/"), locale);

    let jar = jar.add(locale_cookie(locale.code, state.config.secure_cookies()));

    Ok((
        jar,
        Json(LocaleSwitched {
            locale: locale.code,
            path,
        }),
    ))
}
