//! A navigable document: address, title and the node tree

use std::fmt;

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::{DomNode, NodeId};
use crate::utils::is_blank;

#[derive(Debug, Clone)]
pub struct Page {
    address: String,
    title: String,
    arena: DomArena,
}

impl Page {
    /// Wrap a freshly built tree, deriving the title from its `<title>` text
    pub fn new(address: impl Into<String>, arena: DomArena) -> Result<Self> {
        let address = address.into();
        let root_id = arena.root()?.node_id;

        let mut title = String::new();
        for node_id in arena.find_children(root_id, &["title", "data"])? {
            if let Some(text) = arena.get(node_id)?.text() {
                title.push_str(text);
            }
        }
        if is_blank(&title) {
            title = address.clone();
        }

        Ok(Self {
            address,
            title,
            arena,
        })
    }

    /// Wrap a tree whose title is already known (e.g. decoded from page bytes)
    pub fn with_title(
        address: impl Into<String>,
        title: impl Into<String>,
        arena: DomArena,
    ) -> Result<Self> {
        arena.root()?;
        Ok(Self {
            address: address.into(),
            title: title.into(),
            arena,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.arena.root_id()
    }

    pub fn root(&self) -> Result<&DomNode> {
        self.arena.root()
    }

    pub fn node(&self, node_id: NodeId) -> Result<&DomNode> {
        self.arena.get(node_id)
    }

    /// Every node in the tree with tag `selector` (or all for `"*"`), pre-order
    pub fn find_nodes(&self, selector: &str) -> Vec<NodeId> {
        self.find_children(&[selector])
    }

    /// Multi-level descendant selection, e.g. `["title", "data"]`
    pub fn find_children(&self, selectors: &[&str]) -> Vec<NodeId> {
        match self.arena.root_id() {
            Some(root_id) => self
                .arena
                .find_children(root_id, selectors)
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// `href` of every anchor that has one, in document order
    pub fn links(&self) -> Vec<String> {
        self.find_nodes("a")
            .into_iter()
            .filter_map(|id| self.arena.get(id).ok())
            .filter_map(|node| node.get_attr("href"))
            .map(str::to_string)
            .collect()
    }

    /// Release the tree. The page keeps its address and title but no nodes.
    pub fn teardown(&mut self) {
        self.arena.clear();
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", self.title, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_document, ParserConfig};

    fn page(address: &str, html: &str) -> Page {
        Page::new(address, parse_document(html, ParserConfig::default()).unwrap()).unwrap()
    }

    #[test]
    fn test_title_from_title_text() {
        let page = page(
            "http://a.test/",
            "<html><head><title>Hello <b>there</b></title></head><body>x</body></html>",
        );
        assert_eq!(page.title(), "Hello there");
        assert_eq!(page.to_string(), "[Hello there](http://a.test/)");
    }

    #[test]
    fn test_title_falls_back_to_address() {
        let page = page("http://a.test/", "<html><head><title>  </title></head></html>");
        assert_eq!(page.title(), "http://a.test/");

        let page = page_without_title();
        assert_eq!(page.title(), "http://b.test/");
    }

    fn page_without_title() -> Page {
        page("http://b.test/", "<p>no title</p>")
    }

    #[test]
    fn test_links_in_document_order() {
        let page = page(
            "http://a.test/",
            r#"<body><a href="one.html">1</a><a name="anchor">x</a><p><a href="/two.html">2</a></p></body>"#,
        );
        assert_eq!(page.links(), vec!["one.html", "/two.html"]);
    }

    #[test]
    fn test_teardown() {
        let mut page = page("http://a.test/", "<p>x</p>");
        page.teardown();
        assert!(page.root_id().is_none());
        assert!(page.find_nodes("*").is_empty());
    }
}
