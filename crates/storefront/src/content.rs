//! Content management for markdown-based informational pages.
//!
//! Loads markdown files from the `content/pages` directory at startup,
//! parses frontmatter metadata, and renders markdown to HTML. Pages are
//! held in memory for the life of the process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use comrak::{Options, markdown_to_html};
use gray_matter::{Matter, ParsedEntity, engine::YAML};
use serde::Deserialize;
use thiserror::Error;

/// Content loading errors.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Metadata for static pages (about, shipping, etc.)
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A rendered page with metadata and HTML content.
#[derive(Debug, Clone)]
pub struct Page {
    pub slug: String,
    pub meta: PageMeta,
    pub content_html: String,
}

/// Content store that holds all loaded pages in memory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    pages: Arc<HashMap<String, Page>>,
}

impl ContentStore {
    /// Load all content from the filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the pages directory cannot be read. Individual
    /// malformed pages are logged and skipped.
    pub fn load(content_dir: &Path) -> Result<Self, ContentError> {
        let pages = Self::load_pages(&content_dir.join("pages"))?;
        Ok(Self {
            pages: Arc::new(pages),
        })
    }

    /// An empty store (used in tests).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
        }
    }

    /// Get a page by slug.
    #[must_use]
    pub fn page(&self, slug: &str) -> Option<&Page> {
        self.pages.get(slug)
    }

    /// All pages, sorted by slug (for navigation).
    #[must_use]
    pub fn pages(&self) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self.pages.values().collect();
        pages.sort_by(|a, b| a.slug.cmp(&b.slug));
        pages
    }

    fn load_pages(dir: &Path) -> Result<HashMap<String, Page>, ContentError> {
        let mut pages = HashMap::new();

        if !dir.exists() {
            tracing::warn!("Pages directory does not exist: {:?}", dir);
            return Ok(pages);
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ContentError::Io(e.to_string()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                match Self::load_page(&path) {
                    Ok(page) => {
                        tracing::info!("Loaded page: {}", page.slug);
                        pages.insert(page.slug.clone(), page);
                    }
                    Err(e) => {
                        tracing::error!("Failed to load page {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(pages)
    }

    fn load_page(path: &Path) -> Result<Page, ContentError> {
        let content = std::fs::read_to_string(path).map_err(|e| ContentError::Io(e.to_string()))?;

        let slug = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ContentError::Parse("Invalid filename".to_string()))?
            .to_string();

        let matter = Matter::<YAML>::new();
        let parsed: ParsedEntity<PageMeta> = matter
            .parse(&content)
            .map_err(|e| ContentError::Parse(format!("Failed to parse frontmatter: {e}")))?;
        let meta = parsed
            .data
            .ok_or_else(|| ContentError::Parse("Missing frontmatter".to_string()))?;

        let content_html = render_markdown(&parsed.content);

        Ok(Page {
            slug,
            meta,
            content_html,
        })
    }
}

/// Render markdown to HTML.
fn render_markdown(markdown: &str) -> String {
    let mut options = Options::default();
    options.render.r#unsafe = false;
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;

    markdown_to_html(markdown, &options)
}
