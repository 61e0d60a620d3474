use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use yatube_types::views::TemplateResponse;

/// A page to render: the template name and its context, served as JSON.
pub struct Render<C> {
    template: &'static str,
    context: C,
}

impl<C: Serialize> Render<C> {
    pub fn new(template: &'static str, context: C) -> Self {
        Self { template, context }
    }
}

impl<C: Serialize> IntoResponse for Render<C> {
    fn into_response(self) -> Response {
        Json(TemplateResponse {
            template: self.template.to_string(),
            context: self.context,
        })
        .into_response()
    }
}
