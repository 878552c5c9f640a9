//! Collection route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};

use crate::error::Result;
use crate::filters;
use crate::shopify::types::Collection;
use crate::state::AppState;

/// Collections per listing page.
const PAGE_SIZE: i64 = 12;

/// Collection display data for templates.
#[derive(Clone)]
pub struct CollectionView {
    pub handle: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
}

impl From<&Collection> for CollectionView {
    fn from(collection: &Collection) -> Self {
        Self {
            handle: collection.handle.clone(),
            title: collection.title.clone(),
            description: collection.description.clone(),
            image: collection.image.as_ref().map(|img| img.url.clone()),
        }
    }
}

/// Collection listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "collections/index.html")]
pub struct CollectionsIndexTemplate {
    pub collections: Vec<CollectionView>,
}

/// Display collection listing page.
pub async fn index(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let connection = state.storefront().get_collections(PAGE_SIZE, None).await?;

    Ok(CollectionsIndexTemplate {
        collections: connection
            .collections
            .iter()
            .map(CollectionView::from)
            .collect(),
    })
}
