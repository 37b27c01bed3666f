use crate::error::ExtractError;
use crate::models::SourceType;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use lopdf::Document;
use scraper::Html;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Turns a source locator into text content.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, source_type: SourceType, locator: &str)
        -> Result<String, ExtractError>;
}

/// Stand-in content for sources that parsed cleanly but yielded no text.
/// Records carrying these still count as successful extractions.
pub const PDF_EMPTY_SENTINEL: &str = "No extractable text in PDF";
pub const WEB_EMPTY_SENTINEL: &str = "No extractable content from URL";

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Public PDF locators carry this prefix; on disk the files live
/// directly under the media root.
const MEDIA_PREFIX: &str = "media/";

pub struct PdfExtractor {
    media_root: PathBuf,
}

impl PdfExtractor {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let relative = locator.strip_prefix(MEDIA_PREFIX).unwrap_or(locator);
        self.media_root.join(relative)
    }

    pub fn extract(&self, locator: &str) -> Result<String, ExtractError> {
        let path = self.resolve(locator);
        if !path.exists() {
            return Err(ExtractError::NotFound(path.display().to_string()));
        }

        let document =
            Document::load(&path).map_err(|error| ExtractError::PdfParse(error.to_string()))?;

        let mut content = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractError::PdfParse(error.to_string()))?;
            if !text.trim().is_empty() {
                content.push_str(&text);
                content.push('\n');
            }
        }

        Ok(text_or_sentinel(content, PDF_EMPTY_SENTINEL))
    }
}

pub struct WebExtractor {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl WebExtractor {
    pub fn new(retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("http client construction");
        Self { client, retry }
    }

    pub async fn extract(&self, locator: &str) -> Result<String, ExtractError> {
        let target = Url::parse(locator)?;
        if target.scheme() != "http" && target.scheme() != "https" {
            return Err(ExtractError::UnsupportedScheme(locator.to_string()));
        }

        let body = self
            .retry
            .run("web fetch", || {
                let request = self.client.get(target.clone());
                async move { request.send().await?.text().await }
            })
            .await?;

        Ok(text_or_sentinel(visible_text(&body), WEB_EMPTY_SENTINEL))
    }
}

/// Text nodes of the document in order, each trimmed, joined with single
/// spaces. Script and style subtrees are skipped.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<String> = Vec::new();

    for node in document.tree.root().descendants() {
        if let scraper::Node::Text(text) = node.value() {
            let skipped = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|element| matches!(element.name(), "script" | "style"))
            });
            if skipped {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }

    parts.join(" ")
}

fn text_or_sentinel(content: String, sentinel: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        sentinel.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Dispatches a locator to the extractor its source type calls for.
/// Social profiles are public pages, so they go through the web path.
pub struct SourceExtractor {
    pdf: PdfExtractor,
    web: WebExtractor,
}

impl SourceExtractor {
    pub fn new(media_root: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            pdf: PdfExtractor::new(media_root),
            web: WebExtractor::new(retry),
        }
    }
}

#[async_trait]
impl ContentExtractor for SourceExtractor {
    async fn extract(
        &self,
        source_type: SourceType,
        locator: &str,
    ) -> Result<String, ExtractError> {
        match source_type {
            SourceType::Pdf => self.pdf.extract(locator),
            SourceType::SocialMedia | SourceType::Website => self.web.extract(locator).await,
        }
    }
}
