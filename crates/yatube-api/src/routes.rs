use axum::{
    Router,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::state::AppState;
use crate::{auth, posts};

/// Every page of the site plus `/media/` for uploaded files.
pub fn router(state: AppState) -> Router {
    let media = ServeDir::new(state.media.root());

    Router::new()
        .route("/", get(posts::index))
        .route("/group/{slug}/", get(posts::group_posts))
        .route("/profile/{username}/", get(posts::profile))
        .route("/profile/{username}/follow/", get(posts::profile_follow))
        .route("/profile/{username}/unfollow/", get(posts::profile_unfollow))
        .route("/follow/", get(posts::follow_index))
        .route("/create/", get(posts::post_create_form).post(posts::post_create))
        .route("/posts/{post_id}/", get(posts::post_detail))
        .route("/posts/{post_id}/edit/", get(posts::post_edit_form).post(posts::post_edit))
        .route("/posts/{post_id}/comment/", post(posts::add_comment))
        .route("/auth/signup/", get(auth::signup_form).post(auth::signup))
        .route("/auth/login/", get(auth::login_form).post(auth::login))
        .route("/auth/logout/", post(auth::logout))
        .nest_service("/media", media)
        .with_state(state)
}
