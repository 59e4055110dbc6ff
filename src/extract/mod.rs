pub mod coupang;
pub mod elevenst;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::crawler::error::ExtractionError;
use crate::crawler::task::Product;

// Re-export common types
pub use coupang::CoupangExtractor;
pub use elevenst::ElevenStreetExtractor;

/// Text shown instead of a fee when shipping is free
const FREE_SHIPPING: &str = "무료배송";

/// A rendered document read back from a session
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: Url,
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self { url, html: html.into() }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Reads a product off a rendered page of one site
pub trait PageExtractor: Send + Sync {
    /// Short site name for logs
    fn site(&self) -> &'static str;

    /// Registrable domains this extractor handles
    fn domains(&self) -> &[&'static str];

    /// Selector that must be present before the page is worth reading
    fn ready_selector(&self) -> &'static str;

    /// Pull the product fields out of the page
    fn extract(&self, page: &RenderedPage) -> Result<Product, ExtractionError>;

    /// Whether the page has rendered far enough to extract
    fn is_ready(&self, page: &RenderedPage) -> Result<bool, ExtractionError> {
        let document = page.document();
        Ok(first(&document, self.ready_selector())?.is_some())
    }
}

/// Domain-keyed lookup of site extractors
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn PageExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in site
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CoupangExtractor));
        registry.register(Arc::new(ElevenStreetExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn PageExtractor>) {
        debug!("Registered extractor for {}", extractor.site());
        self.extractors.push(extractor);
    }

    /// Find the extractor for the target's host, matching a registered
    /// domain exactly or as a parent domain
    pub fn resolve(&self, target: &Url) -> Result<Arc<dyn PageExtractor>, ExtractionError> {
        let host = target
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_lowercase())
            .ok_or_else(|| ExtractionError::UnsupportedDomain(target.to_string()))?;

        self.extractors
            .iter()
            .find(|extractor| {
                extractor
                    .domains()
                    .iter()
                    .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
            })
            .cloned()
            .ok_or(ExtractionError::UnsupportedDomain(host))
    }

    pub fn sites(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.site()).collect()
    }
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector {
        selector: css.to_string(),
        reason: format!("{:?}", e),
    })
}

/// First element matching `css`
pub(crate) fn first<'a>(document: &'a Html, css: &str) -> Result<Option<ElementRef<'a>>, ExtractionError> {
    let selector = selector(css)?;
    Ok(document.select(&selector).next())
}

/// Trimmed text of the first element matching `css`
pub(crate) fn text_of(document: &Html, css: &str) -> Result<Option<String>, ExtractionError> {
    Ok(first(document, css)?.map(|el| el.text().collect::<String>().trim().to_string()))
}

/// Keep only the digits of `text`; no digits reads as zero
pub(crate) fn parse_amount(text: &str) -> i64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Shipping fee as displayed, free shipping reads as zero
pub(crate) fn parse_shipping_fee(text: &str) -> i64 {
    if text.contains(FREE_SHIPPING) {
        0
    } else {
        parse_amount(text)
    }
}

/// Image URL of an `<img>`, skipping placeholders in favor of the lazy-load source
pub(crate) fn image_src(img: Option<ElementRef<'_>>) -> String {
    let Some(img) = img else {
        return String::new();
    };

    match img.value().attr("src") {
        Some(src) if !src.is_empty() && !src.contains("no_img") => src.to_string(),
        _ => match img.value().attr("data-src") {
            Some(lazy) if lazy.starts_with("//") => format!("https:{}", lazy),
            Some(lazy) => lazy.to_string(),
            None => String::new(),
        },
    }
}

/// Regex over URL paths, compiled on first use
pub(crate) struct UrlPattern {
    source: &'static str,
    compiled: OnceCell<Regex>,
}

impl UrlPattern {
    pub(crate) const fn new(source: &'static str) -> Self {
        Self {
            source,
            compiled: OnceCell::new(),
        }
    }

    fn regex(&self) -> Result<&Regex, ExtractionError> {
        self.compiled.get_or_try_init(|| {
            Regex::new(self.source).map_err(|e| ExtractionError::Pattern {
                pattern: self.source.to_string(),
                reason: e.to_string(),
            })
        })
    }
}

/// First capture of `pattern` in the page URL path
pub(crate) fn product_id(url: &Url, pattern: &UrlPattern) -> Result<String, ExtractionError> {
    Ok(pattern
        .regex()?
        .captures(url.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default())
}

/// Model name is the first word of the title
pub(crate) fn model_name(title: &str) -> String {
    title.split_whitespace().next().unwrap_or_default().to_string()
}
