//! Static informational page handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use crate::error::{AppError, Result};
use crate::filters;
use crate::state::AppState;

/// Static page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/show.html")]
pub struct PageTemplate {
    pub title: String,
    pub content_html: String,
}

/// Display a static page by slug.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let page = state
        .content()
        .page(&slug)
        .ok_or_else(|| AppError::NotFound(format!("page: {slug}")))?;

    Ok(PageTemplate {
        title: page.meta.title.clone(),
        content_html: page.content_html.clone(),
    })
}
