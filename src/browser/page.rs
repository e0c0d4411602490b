use async_trait::async_trait;

use crate::error::Result;

/// Serialised DOM of a page once its dynamic content has rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}

impl RenderedPage {
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// Anything that can turn a url into rendered page content.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn load(&self, url: &str) -> Result<RenderedPage>;
}
