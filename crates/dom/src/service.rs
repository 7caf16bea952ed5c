//! DOM Service - Main entry point for document operations
//!
//! This handles:
//! - HTML text to `Page` (tokenize, build the arena, derive the title)
//! - `Page` to PAGEDATA bytes and back

use crate::error::Result;
use crate::page::Page;
use crate::parser::{parse_document, ParserConfig};
use crate::serializer;

/// Configuration for DOM service
#[derive(Debug, Clone, Copy, Default)]
pub struct DomServiceConfig {
    /// Reject markup with end tags that do not match the open element
    pub strict: bool,
}

impl DomServiceConfig {
    fn parser(&self) -> ParserConfig {
        ParserConfig {
            strict: self.strict,
        }
    }
}

/// Main DOM service
#[derive(Debug, Clone, Default)]
pub struct DomService {
    config: DomServiceConfig,
}

impl DomService {
    /// Create new DOM service with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create DOM service with custom config
    pub fn with_config(config: DomServiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> DomServiceConfig {
        self.config
    }

    /// Parse fetched markup into a page located at `address`
    pub fn parse_page(&self, address: &str, html: &str) -> Result<Page> {
        let arena = parse_document(html, self.config.parser())?;
        let page = Page::new(address, arena)?;
        tracing::debug!(
            address = %page.address(),
            nodes = page.arena().len(),
            "parsed page"
        );
        Ok(page)
    }

    pub fn serialize_page(&self, page: &Page) -> Result<Vec<u8>> {
        serializer::serialize_page(page)
    }

    pub fn deserialize_page(&self, data: &[u8]) -> Result<Page> {
        let page = serializer::deserialize_page(data, self.config.parser())?;
        tracing::debug!(
            address = %page.address(),
            bytes = data.len(),
            "decoded page"
        );
        Ok(page)
    }
}
