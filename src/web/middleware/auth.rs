use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::services::identity_service::{resolve_identity, CallerIdentity, ClaimSet};

/// Identity resolved for the current request; `None` when no credential
/// carried a name identifier.
#[derive(Clone, Debug, Default)]
pub struct MaybeUser(pub Option<CallerIdentity>);

/// Extractor that answers 401 when the request carries no identity.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub identity: CallerIdentity,
}

pub async fn identify(mut request: Request, next: Next) -> Response {
    let allow_query = is_websocket_upgrade(request.headers());
    let identity = extract_token(request.headers(), request.uri().query(), allow_query)
        .and_then(|token| ClaimSet::from_bearer_token(&token))
        .and_then(|claims| resolve_identity(&claims));

    if let Some(identity) = &identity {
        tracing::debug!(user = %identity, "request identified");
    }
    request.extensions_mut().insert(MaybeUser(identity));
    next.run(request).await
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<MaybeUser>().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<MaybeUser>() {
            Some(MaybeUser(Some(identity))) => Ok(AuthenticatedUser {
                identity: identity.clone(),
            }),
            _ => Err(AppError::Unauthenticated),
        }
    }
}

// Authorization header first, then the access_token cookie. Browsers cannot set
// headers on a websocket handshake, so upgrades may also pass ?access_token=.
fn extract_token(headers: &HeaderMap, query: Option<&str>, allow_query: bool) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    let cookie = headers
        .get(header::COOKIE)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|c| c.strip_prefix("access_token="))
        })
        .map(str::to_string);
    if cookie.is_some() {
        return cookie;
    }

    if !allow_query {
        return None;
    }
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|hv| hv.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer h.p.s"));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=c.p.s"),
        );
        assert_eq!(extract_token(&headers, None, false).as_deref(), Some("h.p.s"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(extract_token(&headers, None, false).as_deref(), Some("c.p.s"));
    }

    #[test]
    fn query_token_only_for_upgrades() {
        let headers = HeaderMap::new();
        let query = Some("x=1&access_token=q.p.s");
        assert_eq!(extract_token(&headers, query, false), None);
        assert_eq!(extract_token(&headers, query, true).as_deref(), Some("q.p.s"));
    }
}
