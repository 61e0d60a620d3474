use std::collections::HashMap;

use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info, warn};

use yatube_db::{Database, NewPost, PostChanges, PostFilter};
use yatube_types::api::PageQuery;
use yatube_types::models::{Comment, Group, Post};
use yatube_types::pagination::{PAGE_SIZE, Page, Paginator};
use yatube_types::views::{
    GROUP_LIST_TEMPLATE, GroupListContext, INDEX_TEMPLATE, IndexContext, POST_DETAIL_TEMPLATE,
    POST_FORM_TEMPLATE, PROFILE_TEMPLATE, PostDetailContext, PostFormContext, ProfileContext,
};

use crate::error::{AppError, Result};
use crate::forms::{self, ImageChange, PostSubmission};
use crate::middleware::CurrentUser;
use crate::render::Render;
use crate::state::{AppState, with_db};

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}

pub fn post_detail_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

// -- Listings --

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Render<IndexContext>> {
    let page_obj = paginate(&state, PostFilter::All, query.page).await?;
    Ok(Render::new(INDEX_TEMPLATE, IndexContext { page_obj }))
}

pub async fn group_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Render<GroupListContext>> {
    let lookup = slug.clone();
    let group: Group = with_db(&state, move |db| db.get_group_by_slug(&lookup))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("group '{}'", slug)))?
        .into();

    let page_obj = paginate(&state, PostFilter::Group(group.id), query.page).await?;
    Ok(Render::new(GROUP_LIST_TEMPLATE, GroupListContext { page_obj, group }))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Render<ProfileContext>> {
    let lookup = username.clone();
    let user = with_db(&state, move |db| db.get_user_by_username(&lookup))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user '{}'", username)))?;

    let page_obj = paginate(&state, PostFilter::Author(user.id.clone()), query.page).await?;
    Ok(Render::new(
        PROFILE_TEMPLATE,
        ProfileContext {
            page_obj,
            author: user.author(),
        },
    ))
}

/// One count query plus one joined page query.
async fn paginate(
    state: &AppState,
    filter: PostFilter,
    raw_page: Option<String>,
) -> Result<Page<Post>> {
    with_db(state, move |db| {
        let count = db.count_posts(&filter)?;
        let window = Paginator::new(count, PAGE_SIZE).get_page(raw_page.as_deref());
        let rows = db.list_posts(&filter, window.limit(), window.offset())?;
        Ok(window.into_page(rows.into_iter().map(Post::from).collect()))
    })
    .await
}

// -- Detail --

pub async fn post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Render<PostDetailContext>> {
    let post_id = parse_post_id(&post_id)?;
    let (post, comments) = with_db(&state, move |db| {
        let Some(row) = db.get_post(post_id)? else {
            return Ok(None);
        };
        let comments = db.get_comments_for_post(post_id)?;
        Ok(Some((
            Post::from(row),
            comments.into_iter().map(Comment::from).collect::<Vec<_>>(),
        )))
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

    Ok(Render::new(
        POST_DETAIL_TEMPLATE,
        PostDetailContext {
            post,
            comments,
            form: forms::comment_form(),
        },
    ))
}

// -- Create --

pub async fn post_create_form(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Render<PostFormContext>> {
    let groups = load_groups(&state).await?;
    Ok(Render::new(
        POST_FORM_TEMPLATE,
        PostFormContext {
            form: forms::post_form(&groups),
            edit: false,
            id_post: None,
        },
    ))
}

pub async fn post_create(
    State(state): State<AppState>,
    user: CurrentUser,
    submission: PostSubmission,
) -> Result<Response> {
    let groups = load_groups(&state).await?;
    let input = match forms::validate_post(submission, &groups).await? {
        Ok(input) => input,
        Err(form) => {
            let context = PostFormContext { form, edit: false, id_post: None };
            return Ok(Render::new(POST_FORM_TEMPLATE, context).into_response());
        }
    };

    let saved = match &input.image {
        ImageChange::Replace(img) => Some(state.media.save_post_image(img).await?),
        ImageChange::Keep | ImageChange::Clear => None,
    };

    let author_id = user.id.to_string();
    let (text, group_id, image) = (input.text, input.group_id, saved.clone());
    let post_id = write_post(&state, saved, move |db| {
        db.insert_post(&NewPost {
            text: &text,
            author_id: &author_id,
            group_id,
            image: image.as_deref(),
        })
    })
    .await?;

    info!("Post {} created by {}", post_id, user.username);
    Ok(Redirect::to(&profile_url(&user.username)).into_response())
}

// -- Edit --

pub async fn post_edit_form(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Response> {
    let post = load_post(&state, &post_id).await?;
    if post.author.id != user.id {
        return Ok(Redirect::to(&profile_url(&post.author.username)).into_response());
    }

    let groups = load_groups(&state).await?;
    let context = PostFormContext {
        form: forms::post_form_for(&post, &groups),
        edit: true,
        id_post: Some(post.id),
    };
    Ok(Render::new(POST_FORM_TEMPLATE, context).into_response())
}

pub async fn post_edit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    submission: PostSubmission,
) -> Result<Response> {
    let post = load_post(&state, &post_id).await?;
    if post.author.id != user.id {
        info!("{} tried to edit post {} owned by {}", user.username, post.id, post.author);
        return Ok(Redirect::to(&profile_url(&post.author.username)).into_response());
    }

    let groups = load_groups(&state).await?;
    let input = match forms::validate_post(submission, &groups).await? {
        Ok(input) => input,
        Err(form) => {
            let context = PostFormContext { form, edit: true, id_post: Some(post.id) };
            return Ok(Render::new(POST_FORM_TEMPLATE, context).into_response());
        }
    };

    let saved = match &input.image {
        ImageChange::Replace(img) => Some(state.media.save_post_image(img).await?),
        ImageChange::Keep | ImageChange::Clear => None,
    };
    let image = match input.image {
        ImageChange::Keep => post.image.clone(),
        ImageChange::Clear => None,
        ImageChange::Replace(_) => saved.clone(),
    };

    let id = post.id;
    let (text, group_id) = (input.text, input.group_id);
    write_post(&state, saved, move |db| {
        db.update_post(
            id,
            &PostChanges {
                text: &text,
                group_id,
                image: image.as_deref(),
            },
        )
    })
    .await?;

    info!("Post {} edited by {}", id, user.username);
    Ok(Redirect::to(&post_detail_url(id)).into_response())
}

// -- Comments --

pub async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Redirect> {
    let post = load_post(&state, &post_id).await?;

    match forms::validate_comment(&fields) {
        Ok(text) => {
            let (id, author_id) = (post.id, user.id.to_string());
            let comment_id =
                with_db(&state, move |db| db.insert_comment(id, &author_id, &text)).await?;
            info!("Comment {} on post {} by {}", comment_id, post.id, user.username);
        }
        Err(form) => {
            debug!("Comment on post {} dropped: {:?}", post.id, form.errors);
        }
    }

    Ok(Redirect::to(&post_detail_url(post.id)))
}

// -- Follow --
// Routes exist; following is not implemented.

pub async fn follow_index(_user: CurrentUser) -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

pub async fn profile_follow(_user: CurrentUser, Path(_username): Path<String>) -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

pub async fn profile_unfollow(_user: CurrentUser, Path(_username): Path<String>) -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

// -- Helpers --

/// Non-numeric ids are simply unknown posts.
fn parse_post_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("post '{}'", raw)))
}

async fn load_post(state: &AppState, raw_id: &str) -> Result<Post> {
    let post_id = parse_post_id(raw_id)?;
    with_db(state, move |db| db.get_post(post_id))
        .await?
        .map(Post::from)
        .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
}

async fn load_groups(state: &AppState) -> Result<Vec<Group>> {
    let rows = with_db(state, |db| db.list_groups()).await?;
    Ok(rows.into_iter().map(Group::from).collect())
}

/// Runs a post write that refers to a freshly saved image. If the write
/// fails the image is deleted again.
async fn write_post<F, T>(state: &AppState, saved: Option<String>, write: F) -> Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = with_db(state, write).await;
    if let (Err(_), Some(path)) = (&result, saved) {
        if let Err(e) = state.media.delete(&path).await {
            warn!("Failed to remove orphaned image {}: {}", path, e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use axum::body::Bytes;

    use crate::forms::ValidImage;
    use crate::media::MediaStore;
    use crate::state::AppStateInner;

    use super::*;

    async fn state(media_root: &std::path::Path) -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            secret_key: "test-secret".into(),
            media: MediaStore::new(media_root.to_path_buf()).await.unwrap(),
        })
    }

    async fn saved_image(state: &AppState) -> String {
        let image = ValidImage {
            bytes: Bytes::from_static(b"stored bytes"),
            extension: "png",
        };
        state.media.save_post_image(&image).await.unwrap()
    }

    #[tokio::test]
    async fn failed_write_removes_saved_image() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let path = saved_image(&state).await;
        assert!(state.media.path_of(&path).exists());

        let result: Result<()> =
            write_post(&state, Some(path.clone()), |_| Err(anyhow!("insert failed"))).await;
        assert!(result.is_err());
        assert!(!state.media.path_of(&path).exists());
    }

    #[tokio::test]
    async fn successful_write_keeps_saved_image() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let path = saved_image(&state).await;

        let n = write_post(&state, Some(path.clone()), |db| db.count_posts(&PostFilter::All))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(state.media.path_of(&path).exists());
    }
}
