//! Context documents handed to the template layer.
//!
//! Every rendered page is a `TemplateResponse`: the template name plus the
//! context the template reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Author, Comment, Group, Post};
use crate::pagination::Page;

pub const INDEX_TEMPLATE: &str = "posts/index.html";
pub const GROUP_LIST_TEMPLATE: &str = "posts/group_list.html";
pub const PROFILE_TEMPLATE: &str = "posts/profile.html";
pub const POST_DETAIL_TEMPLATE: &str = "posts/post_detail.html";
pub const POST_FORM_TEMPLATE: &str = "posts/create_post.html";
pub const LOGIN_TEMPLATE: &str = "users/login.html";
pub const SIGNUP_TEMPLATE: &str = "users/signup.html";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateResponse<C> {
    pub template: String,
    pub context: C,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexContext {
    pub page_obj: Page<Post>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupListContext {
    pub page_obj: Page<Post>,
    pub group: Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileContext {
    pub page_obj: Page<Post>,
    pub author: Author,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetailContext {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub form: FormView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostFormContext {
    pub form: FormView,
    pub edit: bool,
    pub id_post: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginContext {
    pub form: FormView,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupContext {
    pub form: FormView,
}

// -- Forms --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Char,
    Password,
    Choice,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
}

/// A form as the template sees it: field metadata, the values to show,
/// and per-field error messages. `bound` is true once data was submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormView {
    pub fields: Vec<FieldView>,
    pub data: BTreeMap<String, String>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub bound: bool,
}

impl FormView {
    pub fn field(&self, name: &str) -> Option<&FieldView> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_valid(&self) -> bool {
        self.bound && self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }
}
