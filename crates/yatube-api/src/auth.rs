use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use yatube_types::api::{Claims, LoginRequest, NextQuery, SignupRequest};
use yatube_types::views::{LOGIN_TEMPLATE, LoginContext, SIGNUP_TEMPLATE, SignupContext};

use crate::error::{AppError, Result};
use crate::forms::{self, NON_FIELD_ERRORS};
use crate::middleware::SESSION_COOKIE;
use crate::render::Render;
use crate::state::{AppState, with_db};

const SESSION_DAYS: i64 = 30;

pub async fn signup_form() -> Render<SignupContext> {
    Render::new(SIGNUP_TEMPLATE, SignupContext { form: forms::signup_form() })
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<SignupRequest>,
) -> Result<Response> {
    if let Err(form) = forms::validate_signup(&req) {
        return Ok(Render::new(SIGNUP_TEMPLATE, SignupContext { form }).into_response());
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    // Uniqueness is decided by the insert, not by a prior lookup
    let user_id = Uuid::new_v4();
    let (id, username) = (user_id.to_string(), req.username.clone());
    let created =
        with_db(&state, move |db| db.create_user(&id, &username, &password_hash)).await?;
    if !created {
        let mut form = forms::signup_form();
        form.bound = true;
        form.data.insert("username".to_string(), req.username.clone());
        form.add_error("username", "A user with that username already exists.");
        return Ok(Render::new(SIGNUP_TEMPLATE, SignupContext { form }).into_response());
    }
    info!("User '{}' signed up", req.username);

    let token = create_token(&state.secret_key, user_id, &req.username)?;
    Ok((jar.add(session_cookie(token)), Redirect::to("/")).into_response())
}

pub async fn login_form(Query(query): Query<NextQuery>) -> Render<LoginContext> {
    Render::new(
        LOGIN_TEMPLATE,
        LoginContext {
            form: forms::login_form(),
            next: query.next.filter(|n| is_safe_next(n)),
        },
    )
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<LoginRequest>,
) -> Result<Response> {
    let next = req.next.clone().filter(|n| is_safe_next(n));

    let username = req.username.clone();
    let user = with_db(&state, move |db| db.get_user_by_username(&username)).await?;

    let verified = user.filter(|user| {
        PasswordHash::new(&user.password)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(req.password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    });

    let Some(user) = verified else {
        warn!("Failed login for '{}'", req.username);
        let mut form = forms::bound_login_form(&req);
        form.add_error(
            NON_FIELD_ERRORS,
            "Please enter a correct username and password. Note that both fields may be case-sensitive.",
        );
        return Ok(Render::new(LOGIN_TEMPLATE, LoginContext { form, next }).into_response());
    };

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;
    let token = create_token(&state.secret_key, user_id, &user.username)?;

    info!("User '{}' logged in", user.username);
    let target = next.unwrap_or_else(|| "/".to_string());
    Ok((jar.add(session_cookie(token)), Redirect::to(&target)).into_response())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/");
    (jar.remove(removal), Redirect::to("/"))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Only same-site absolute paths are followed after login. Browsers drop
/// tabs and newlines from URLs, so control characters are refused too.
fn is_safe_next(next: &str) -> bool {
    next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control)
}
