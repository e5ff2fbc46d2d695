use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cookie::{Cookie, SameSite};

use super::service::{AccessError, AccessService};

pub const TOKEN_COOKIE: &str = "token";

fn token_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .build()
}

/// HttpOnly, SameSite=Strict `token` cookie that expires with the token.
pub fn session_cookie(token: &str, ttl: chrono::Duration, secure: bool) -> String {
    let mut cookie = token_cookie(token.to_string(), secure);
    cookie.set_max_age(cookie::time::Duration::seconds(ttl.num_seconds()));
    cookie.to_string()
}

/// Counterpart of [`session_cookie`] that tells the browser to drop it.
pub fn cleared_session_cookie(secure: bool) -> String {
    let mut cookie = token_cookie(String::new(), secure);
    cookie.make_removal();
    cookie.to_string()
}

/// Pull a bearer token from the `Authorization` header, falling back to the `token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == TOKEN_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authenticate the request and attach the [`super::AdminSession`] as an extension.
pub async fn require_admin(
    State(access): State<Arc<AccessService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return AccessError::Unauthorized("Not authorized to access this route".to_string())
            .into_response();
    };

    match access.authenticate(&token).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}
