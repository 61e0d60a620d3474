#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use yatube_api::auth::create_token;
use yatube_api::media::MediaStore;
use yatube_api::middleware::SESSION_COOKIE;
use yatube_api::{AppState, AppStateInner};
use yatube_db::{Database, NewPost};

pub const SECRET: &str = "test-secret";
pub const GROUP_SLUG: &str = "testgroup";
pub const AUTHOR_USERNAME: &str = "Alex";

pub const URL_INDEX: &str = "/";
pub const URL_GROUP: &str = "/group/testgroup/";
pub const URL_AUTHOR: &str = "/profile/Alex/";
pub const URL_CREATE_POST: &str = "/create/";

pub struct TestApp {
    pub state: AppState,
    router: Router,
    _media: TempDir,
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub session: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let media = tempfile::tempdir().unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            secret_key: SECRET.to_string(),
            media: MediaStore::new(media.path().to_path_buf()).await.unwrap(),
        });
        let router = yatube_api::router(state.clone());
        Self { state, router, _media: media }
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Creates a user and a session for them, without going through login.
    pub fn user(&self, username: &str) -> TestUser {
        let id = Uuid::new_v4();
        self.db().create_user(&id.to_string(), username, "!").unwrap();
        let token = create_token(SECRET, id, username).unwrap();
        TestUser {
            id,
            username: username.to_string(),
            session: format!("{}={}", SESSION_COOKIE, token),
        }
    }

    pub fn group(&self, title: &str, slug: &str) -> i64 {
        self.db().create_group(title, slug, "Test desc").unwrap()
    }

    pub fn post(&self, author: &TestUser, text: &str, group_id: Option<i64>) -> i64 {
        let author_id = author.id.to_string();
        self.db()
            .insert_post(&NewPost { text, author_id: &author_id, group_id, image: None })
            .unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<&TestUser>) -> Response<Body> {
        let mut req = Request::get(uri);
        if let Some(user) = user {
            req = req.header(header::COOKIE, &user.session);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        body: &str,
        user: Option<&TestUser>,
    ) -> Response<Body> {
        let mut req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(user) = user {
            req = req.header(header::COOKIE, &user.session);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

pub async fn json(resp: Response<Body>) -> Value {
    assert_eq!(resp.status(), StatusCode::OK, "expected a rendered page");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(resp: &Response<Body>) -> String {
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "expected a redirect");
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string()
}

/// `name=value` of the session cookie a response sets.
pub fn session_cookie(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(SESSION_COOKIE))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn login_url(next: &str) -> String {
    format!("/auth/login/?next={}", urlencoding::encode(next))
}
