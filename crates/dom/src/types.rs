//! Core type definitions for the document model
//!
//! Key design principles:
//! 1. Use u32 for indices (4 bytes vs 8 bytes pointer)
//! 2. One node type for every tag; behaviour comes from a lookup table, not subtypes
//! 3. Use SmallVec for small arrays (avoid heap allocation)

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Node identifier (index into arena)
pub type NodeId = u32;

/// Ordered attribute list. Duplicate keys are allowed; lookups act on the first match.
pub type Attributes = SmallVec<[(String, String); 2]>;

/// Tag used for synthetic text-run nodes
pub const DATA_TAG: &str = "data";

/// Attribute holding the text of a data node
pub const TEXT_ATTR: &str = "text";

/// Selector matching every node
pub const WILDCARD: &str = "*";

/// Tags that can never hold children
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// What a tag means to the document model and the display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Data,
    Document,
    Head,
    Title,
    Body,
    Division,
    Paragraph,
    Span,
    Emphasis,
    Strong,
    Anchor,
    Heading(u8),
    Preformatted,
    BlockQuote,
    UnorderedList,
    OrderedList,
    ListItem,
    Table,
    TableRow,
    TableCell,
    LineBreak,
    Rule,
    Image,
    Script,
    Style,
    Metadata,
    Generic,
}

/// How a display surface lays out a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    Inline,
    Block,
    LineBreak,
    Hidden,
}

/// Fixed tag -> kind dispatch table. Tags not listed map to `TagKind::Generic`.
const TAG_TABLE: &[(&str, TagKind)] = &[
    ("data", TagKind::Data),
    ("html", TagKind::Document),
    ("head", TagKind::Head),
    ("title", TagKind::Title),
    ("body", TagKind::Body),
    ("div", TagKind::Division),
    ("section", TagKind::Division),
    ("article", TagKind::Division),
    ("header", TagKind::Division),
    ("footer", TagKind::Division),
    ("nav", TagKind::Division),
    ("main", TagKind::Division),
    ("p", TagKind::Paragraph),
    ("span", TagKind::Span),
    ("em", TagKind::Emphasis),
    ("i", TagKind::Emphasis),
    ("strong", TagKind::Strong),
    ("b", TagKind::Strong),
    ("a", TagKind::Anchor),
    ("h1", TagKind::Heading(1)),
    ("h2", TagKind::Heading(2)),
    ("h3", TagKind::Heading(3)),
    ("h4", TagKind::Heading(4)),
    ("h5", TagKind::Heading(5)),
    ("h6", TagKind::Heading(6)),
    ("pre", TagKind::Preformatted),
    ("blockquote", TagKind::BlockQuote),
    ("ul", TagKind::UnorderedList),
    ("ol", TagKind::OrderedList),
    ("li", TagKind::ListItem),
    ("table", TagKind::Table),
    ("tr", TagKind::TableRow),
    ("td", TagKind::TableCell),
    ("th", TagKind::TableCell),
    ("br", TagKind::LineBreak),
    ("hr", TagKind::Rule),
    ("img", TagKind::Image),
    ("script", TagKind::Script),
    ("style", TagKind::Style),
    ("meta", TagKind::Metadata),
    ("link", TagKind::Metadata),
    ("base", TagKind::Metadata),
];

impl TagKind {
    pub fn from_tag(tag: &str) -> Self {
        TAG_TABLE
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, kind)| *kind)
            .unwrap_or(TagKind::Generic)
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            TagKind::Heading(level) => Some(*level),
            _ => None,
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            TagKind::Head
            | TagKind::Title
            | TagKind::Script
            | TagKind::Style
            | TagKind::Metadata => Layout::Hidden,
            TagKind::LineBreak => Layout::LineBreak,
            TagKind::Document
            | TagKind::Body
            | TagKind::Division
            | TagKind::Paragraph
            | TagKind::Heading(_)
            | TagKind::Preformatted
            | TagKind::BlockQuote
            | TagKind::UnorderedList
            | TagKind::OrderedList
            | TagKind::ListItem
            | TagKind::Table
            | TagKind::TableRow
            | TagKind::Rule => Layout::Block,
            TagKind::Data
            | TagKind::Span
            | TagKind::Emphasis
            | TagKind::Strong
            | TagKind::Anchor
            | TagKind::TableCell
            | TagKind::Image
            | TagKind::Generic => Layout::Inline,
        }
    }
}

/// One element or text run
///
/// Design philosophy:
/// - Use indices instead of pointers; `parent_id` is a back-reference only
/// - Children are stored in document order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub node_id: NodeId,
    pub tag: String,
    pub kind: TagKind,
    pub attrs: Attributes,

    pub parent_id: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>, // Most nodes have <4 children
}

impl DomNode {
    pub fn new(node_id: NodeId, tag: impl Into<String>, attrs: Attributes) -> Self {
        let tag = tag.into();
        Self {
            node_id,
            kind: TagKind::from_tag(&tag),
            tag,
            attrs,
            parent_id: None,
            children_ids: SmallVec::new(),
        }
    }

    /// First value stored under `name`
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Mutable access to the first value stored under `name`
    pub fn attr_mut(&mut self, name: &str) -> Option<&mut String> {
        self.attrs
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Remove the first attribute named `name`, returning its value
    pub fn clear_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }

    /// Text of a data node
    pub fn text(&self) -> Option<&str> {
        if self.is_data() {
            self.get_attr(TEXT_ATTR)
        } else {
            None
        }
    }

    pub fn is_data(&self) -> bool {
        self.kind == TagKind::Data
    }

    pub fn is_void(&self) -> bool {
        is_void_tag(&self.tag)
    }

    pub fn matches(&self, selector: &str) -> bool {
        selector == WILDCARD || self.tag == selector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_tag_dispatch() {
        assert_eq!(TagKind::from_tag("h3"), TagKind::Heading(3));
        assert_eq!(TagKind::from_tag("h3").heading_level(), Some(3));
        assert_eq!(TagKind::from_tag("blink"), TagKind::Generic);
        assert_eq!(TagKind::from_tag("title").layout(), Layout::Hidden);
        assert_eq!(TagKind::from_tag("br").layout(), Layout::LineBreak);
    }

    #[test]
    fn test_first_match_attributes() {
        let mut node = DomNode::new(
            0,
            "a",
            smallvec![
                ("href".to_string(), "one.html".to_string()),
                ("href".to_string(), "two.html".to_string()),
            ],
        );

        assert_eq!(node.get_attr("href"), Some("one.html"));
        assert_eq!(node.get_attr("missing"), None);

        assert_eq!(node.clear_attr("href"), Some("one.html".to_string()));
        assert_eq!(node.get_attr("href"), Some("two.html"));
        assert_eq!(node.clear_attr("missing"), None);
    }

    #[test]
    fn test_void_tags() {
        assert!(is_void_tag("img"));
        assert!(!is_void_tag("p"));
        assert!(DomNode::new(0, "wbr", Attributes::new()).is_void());
    }
}
