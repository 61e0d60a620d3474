use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;
use uuid::Uuid;

use yatube_types::models::Author;

use crate::auth::decode_token;
use crate::state::{AppState, with_db};

pub const SESSION_COOKIE: &str = "yatube_session";
pub const LOGIN_URL: &str = "/auth/login/";

/// The authenticated principal. Extracting it on a route makes the route
/// login-only: anonymous requests are redirected to the login page with
/// the requested path as `next`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
}

impl CurrentUser {
    pub fn author(&self) -> Author {
        Author {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let Some(token) = session_token(&parts.headers) else {
            return Err(login_redirect(&next));
        };

        let claims = match decode_token(&token, &state.secret_key) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Rejected session token: {}", e);
                return Err(login_redirect(&next));
            }
        };

        // A token can outlive its user
        let user_id = claims.sub.to_string();
        let user = with_db(state, move |db| db.get_user_by_id(&user_id))
            .await
            .map_err(IntoResponse::into_response)?;

        match user {
            Some(row) => Ok(CurrentUser {
                id: claims.sub,
                username: row.username,
            }),
            None => Err(login_redirect(&next)),
        }
    }
}

/// Bearer header first, then the session cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
    })
}

pub fn login_redirect(next: &str) -> Response {
    Redirect::to(&format!("{}?next={}", LOGIN_URL, urlencoding::encode(next))).into_response()
}
