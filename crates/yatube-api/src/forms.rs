//! Post, comment and account forms: field metadata for rendering, and
//! validation of submitted values.

use std::collections::{BTreeMap, HashMap};

use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use anyhow::anyhow;
use tracing::{debug, error};

use yatube_types::api::{LoginRequest, SignupRequest};
use yatube_types::models::{Group, Post};
use yatube_types::views::{Choice, FieldKind, FieldView, FormView};

use crate::error::AppError;

pub const COMMENT_MAX_CHARS: usize = 140;
pub const USERNAME_MAX_CHARS: usize = 150;
pub const PASSWORD_MIN_CHARS: usize = 8;

/// Form key for errors not tied to one field.
pub const NON_FIELD_ERRORS: &str = "__all__";

const REQUIRED: &str = "This field is required.";
const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
const EMPTY_FILE: &str = "The submitted file is empty.";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Checkbox that removes the stored image on edit.
const IMAGE_CLEAR_FIELD: &str = "image-clear";

// -- Submissions --

pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Bytes,
}

/// A post form as submitted, either url-encoded or multipart.
#[derive(Default)]
pub struct PostSubmission {
    pub fields: HashMap<String, String>,
    pub image: Option<UploadedImage>,
}

impl<S> FromRequest<S> for PostSubmission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            return Ok(Self { fields, image: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let mut submission = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                // Browsers send the part with an empty filename when no file was picked
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                if !file_name.is_empty() {
                    submission.image = Some(UploadedImage { file_name, bytes });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                submission.fields.insert(name, value);
            }
        }
        Ok(submission)
    }
}

// -- Post form --

pub struct ValidImage {
    pub bytes: Bytes,
    pub extension: &'static str,
}

pub enum ImageChange {
    Keep,
    Clear,
    Replace(ValidImage),
}

/// A validated post form.
pub struct PostInput {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: ImageChange,
}

fn post_fields(groups: &[Group]) -> Vec<FieldView> {
    let mut choices = vec![Choice {
        value: String::new(),
        label: "---------".into(),
    }];
    choices.extend(groups.iter().map(|g| Choice {
        value: g.id.to_string(),
        label: g.to_string(),
    }));

    vec![
        FieldView {
            name: "group".into(),
            label: "Group".into(),
            kind: FieldKind::Choice,
            required: false,
            max_length: None,
            choices,
        },
        FieldView {
            name: "text".into(),
            label: "Text".into(),
            kind: FieldKind::Char,
            required: true,
            max_length: None,
            choices: vec![],
        },
        FieldView {
            name: "image".into(),
            label: "Image".into(),
            kind: FieldKind::Image,
            required: false,
            max_length: None,
            choices: vec![],
        },
    ]
}

/// Empty form for a new post.
pub fn post_form(groups: &[Group]) -> FormView {
    FormView {
        fields: post_fields(groups),
        ..FormView::default()
    }
}

/// Form pre-filled from an existing post.
pub fn post_form_for(post: &Post, groups: &[Group]) -> FormView {
    let mut data = BTreeMap::new();
    data.insert("text".to_string(), post.text.clone());
    data.insert(
        "group".to_string(),
        post.group.as_ref().map(|g| g.id.to_string()).unwrap_or_default(),
    );
    if let Some(path) = &post.image {
        data.insert("image".to_string(), path.clone());
    }
    FormView {
        fields: post_fields(groups),
        data,
        ..FormView::default()
    }
}

/// Validates a post submission against the known groups. On failure the
/// inner result is the form carrying the submitted values and field errors.
pub async fn validate_post(
    submission: PostSubmission,
    groups: &[Group],
) -> Result<Result<PostInput, FormView>, AppError> {
    let PostSubmission { fields, image } = submission;
    let checked = match image {
        Some(upload) => Some(check_image(upload).await?),
        None => None,
    };

    let mut form = post_form(groups);
    form.bound = true;
    for name in ["text", "group"] {
        if let Some(value) = fields.get(name) {
            form.data.insert(name.to_string(), value.clone());
        }
    }

    let text = fields.get("text").map(|t| t.trim()).unwrap_or_default();
    if text.is_empty() {
        form.add_error("text", REQUIRED);
    }

    let group_id = match fields.get("group").map(|g| g.trim()).filter(|g| !g.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) if groups.iter().any(|g| g.id == id) => Some(id),
            _ => {
                form.add_error("group", INVALID_CHOICE);
                None
            }
        },
    };

    let image = match checked {
        Some(result) => match result {
            Ok(valid) => ImageChange::Replace(valid),
            Err(message) => {
                form.add_error("image", message);
                ImageChange::Keep
            }
        },
        None if is_checked(fields.get(IMAGE_CLEAR_FIELD)) => ImageChange::Clear,
        None => ImageChange::Keep,
    };

    if !form.errors.is_empty() {
        debug!("Post form rejected: {:?}", form.errors);
        return Ok(Err(form));
    }

    Ok(Ok(PostInput {
        text: text.to_string(),
        group_id,
        image,
    }))
}

fn is_checked(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("on" | "true" | "1"))
}

/// Decodes the upload on the blocking pool.
async fn check_image(
    upload: UploadedImage,
) -> Result<Result<ValidImage, &'static str>, AppError> {
    tokio::task::spawn_blocking(move || validate_image(upload))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Internal(anyhow!("image check failed: {}", e))
        })
}

/// Accepts only files that decode as an image.
fn validate_image(upload: UploadedImage) -> Result<ValidImage, &'static str> {
    if upload.bytes.is_empty() {
        return Err(EMPTY_FILE);
    }

    let format = image::guess_format(&upload.bytes).map_err(|_| INVALID_IMAGE)?;
    image::load_from_memory_with_format(&upload.bytes, format).map_err(|e| {
        debug!("Image '{}' failed to decode: {}", upload.file_name, e);
        INVALID_IMAGE
    })?;

    let extension = format.extensions_str().first().copied().ok_or(INVALID_IMAGE)?;
    Ok(ValidImage {
        bytes: upload.bytes,
        extension,
    })
}

// -- Comment form --

pub fn comment_form() -> FormView {
    FormView {
        fields: vec![FieldView {
            name: "text".into(),
            label: "Text".into(),
            kind: FieldKind::Char,
            required: true,
            max_length: Some(COMMENT_MAX_CHARS),
            choices: vec![],
        }],
        ..FormView::default()
    }
}

/// Returns the trimmed comment text, or the form with its errors.
pub fn validate_comment(fields: &HashMap<String, String>) -> Result<String, FormView> {
    let mut form = comment_form();
    form.bound = true;

    let text = fields.get("text").map(|t| t.trim()).unwrap_or_default();
    form.data.insert("text".to_string(), text.to_string());

    let len = text.chars().count();
    if len == 0 {
        form.add_error("text", REQUIRED);
    } else if len > COMMENT_MAX_CHARS {
        form.add_error(
            "text",
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                COMMENT_MAX_CHARS, len
            ),
        );
    }

    if form.errors.is_empty() {
        Ok(text.to_string())
    } else {
        Err(form)
    }
}

// -- Account forms --

fn credential_fields() -> Vec<FieldView> {
    vec![
        FieldView {
            name: "username".into(),
            label: "Username".into(),
            kind: FieldKind::Char,
            required: true,
            max_length: Some(USERNAME_MAX_CHARS),
            choices: vec![],
        },
        FieldView {
            name: "password".into(),
            label: "Password".into(),
            kind: FieldKind::Password,
            required: true,
            max_length: None,
            choices: vec![],
        },
    ]
}

pub fn login_form() -> FormView {
    FormView {
        fields: credential_fields(),
        ..FormView::default()
    }
}

pub fn signup_form() -> FormView {
    FormView {
        fields: credential_fields(),
        ..FormView::default()
    }
}

/// Login form echoing the username back; passwords are never re-rendered.
pub fn bound_login_form(req: &LoginRequest) -> FormView {
    let mut form = login_form();
    form.bound = true;
    form.data.insert("username".to_string(), req.username.clone());
    form
}

/// Checks the shape of a signup. Uniqueness is checked against the store
/// by the caller.
pub fn validate_signup(req: &SignupRequest) -> Result<(), FormView> {
    let mut form = signup_form();
    form.bound = true;
    form.data.insert("username".to_string(), req.username.clone());

    let username = req.username.as_str();
    let len = username.chars().count();
    if len == 0 {
        form.add_error("username", REQUIRED);
    } else if len > USERNAME_MAX_CHARS {
        form.add_error(
            "username",
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                USERNAME_MAX_CHARS, len
            ),
        );
    } else if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        form.add_error(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    if req.password.is_empty() {
        form.add_error("password", REQUIRED);
    } else if req.password.chars().count() < PASSWORD_MIN_CHARS {
        form.add_error(
            "password",
            format!(
                "This password is too short. It must contain at least {} characters.",
                PASSWORD_MIN_CHARS
            ),
        );
    }

    if form.errors.is_empty() { Ok(()) } else { Err(form) }
}
