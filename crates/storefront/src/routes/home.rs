//! Home page handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};

use crate::error::Result;
use crate::filters;
use crate::routes::products::ProductView;
use crate::state::AppState;

/// Featured products shown on the home page.
const FEATURED_COUNT: i64 = 8;

/// Feed items shown on the home page strip.
const FEED_COUNT: usize = 6;

/// Feed item display data for templates.
#[derive(Clone)]
pub struct FeedItemView {
    pub image: String,
    pub permalink: String,
    pub caption: String,
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub products: Vec<ProductView>,
    pub feed: Vec<FeedItemView>,
}

/// Display the home page.
pub async fn home(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let connection = state.storefront().get_products(FEATURED_COUNT, None).await?;

    // The feed strip is decorative: failures degrade to empty, never a 500.
    let feed = match state.instagram() {
        Some(client) => match client.recent_media(FEED_COUNT).await {
            Ok(items) => items
                .into_iter()
                .map(|item| FeedItemView {
                    image: item.media_url,
                    permalink: item.permalink,
                    caption: item.caption.unwrap_or_default(),
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to load feed: {e}");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    Ok(HomeTemplate {
        products: connection.products.iter().map(ProductView::from).collect(),
        feed,
    })
}
