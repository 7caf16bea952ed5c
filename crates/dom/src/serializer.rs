//! Binary page codec
//!
//! Compact, self-delimiting encoding of a `Page` used as the PAGEDATA payload.
//!
//! ```text
//! Page      := OBJECT "page" Field(title) Field(address) Field(root=HtmlNode) END_OBJECT
//! HtmlNode  := OBJECT <tag> [Field(attr=AttrList)] [Field(children=NodeList)] END_OBJECT
//! AttrList  := LIST_VALUE Field(key=TextValue)* END_LIST_VALUE
//! NodeList  := LIST_VALUE HtmlNode* END_LIST_VALUE
//! Field     := FIELD <name> (TextValue | AttrList | NodeList | HtmlNode)
//! TextValue := TEXT_VALUE <utf8 bytes up to the next control byte>
//! ```
//!
//! Names and text end at the next control byte. Any byte below 0x20 inside
//! them is written as `ESCAPE, byte | 0x40`, so the only raw bytes below
//! 0x20 in the stream are structural.
//!
//! Decoding is two passes: the bytes are parsed into a flat generic tree of
//! objects, fields and lists, then the tree is replayed as start-tag /
//! end-tag events into the same `TreeBuilder` the HTML parser uses. The
//! replay calls `end_tag` for every node, void ones included. Every pass
//! walks with an explicit stack, so deep nesting cannot exhaust the call stack.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::page::Page;
use crate::parser::{ParserConfig, TagSink, TreeBuilder};
use crate::types::NodeId;

pub const OBJECT: u8 = 0x00;
pub const END_OBJECT: u8 = 0x01;
pub const FIELD: u8 = 0x02;
pub const TEXT_VALUE: u8 = 0x03;
pub const LIST_VALUE: u8 = 0x04;
pub const END_LIST_VALUE: u8 = 0x05;
pub const ESCAPE: u8 = 0x06;

/// First byte value that is written literally
const PRINTABLE: u8 = 0x20;
const ESCAPE_OFFSET: u8 = 0x40;

const PAGE_OBJECT: &str = "page";
const TITLE_FIELD: &str = "title";
const ADDRESS_FIELD: &str = "address";
const ROOT_FIELD: &str = "root";
const ATTR_FIELD: &str = "attr";
const CHILDREN_FIELD: &str = "children";

/// Streaming writer for the page format
#[derive(Debug, Default)]
pub struct PageSerializer {
    out: Vec<u8>,
}

impl PageSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_escaped(&mut self, data: &str) {
        for &b in data.as_bytes() {
            if b < PRINTABLE {
                self.out.push(ESCAPE);
                self.out.push(b | ESCAPE_OFFSET);
            } else {
                self.out.push(b);
            }
        }
    }

    pub fn object(&mut self, name: &str) -> &mut Self {
        self.out.push(OBJECT);
        self.write_escaped(name);
        self
    }

    pub fn end_object(&mut self) -> &mut Self {
        self.out.push(END_OBJECT);
        self
    }

    pub fn field(&mut self, name: &str) -> &mut Self {
        self.out.push(FIELD);
        self.write_escaped(name);
        self
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.out.push(TEXT_VALUE);
        self.write_escaped(text);
        self
    }

    pub fn start_list(&mut self) -> &mut Self {
        self.out.push(LIST_VALUE);
        self
    }

    pub fn end_list(&mut self) -> &mut Self {
        self.out.push(END_LIST_VALUE);
        self
    }

    /// Write `node_id` and its subtree, depth-first with an explicit stack
    pub fn html_node(&mut self, arena: &DomArena, node_id: NodeId) -> Result<&mut Self> {
        enum Visit {
            Enter(NodeId),
            /// Close a node that opened a children list
            Leave,
        }

        let mut stack = vec![Visit::Enter(node_id)];
        while let Some(visit) = stack.pop() {
            let node_id = match visit {
                Visit::Enter(node_id) => node_id,
                Visit::Leave => {
                    self.end_list().end_object();
                    continue;
                }
            };

            let node = arena.get(node_id)?;
            self.object(&node.tag);

            if !node.attrs.is_empty() {
                self.field(ATTR_FIELD).start_list();
                for (key, value) in &node.attrs {
                    self.field(key).text(value);
                }
                self.end_list();
            }

            if node.children_ids.is_empty() {
                self.end_object();
            } else {
                self.field(CHILDREN_FIELD).start_list();
                stack.push(Visit::Leave);
                stack.extend(node.children_ids.iter().rev().map(|&id| Visit::Enter(id)));
            }
        }

        Ok(self)
    }

    pub fn page(&mut self, page: &Page) -> Result<&mut Self> {
        let root_id = page.root()?.node_id;
        self.object(PAGE_OBJECT);
        self.field(TITLE_FIELD).text(page.title());
        self.field(ADDRESS_FIELD).text(page.address());
        self.field(ROOT_FIELD).html_node(page.arena(), root_id)?;
        Ok(self.end_object())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// Serialize a page into its binary form
pub fn serialize_page(page: &Page) -> Result<Vec<u8>> {
    let mut serializer = PageSerializer::new();
    serializer.page(page)?;
    Ok(serializer.into_bytes())
}

/// Index of an object in a [`DecodedTree`]
pub type ObjectId = usize;

/// Generic decoded stream: objects stored flat, linked by `ObjectId`
///
/// Flat storage keeps decoding, replay and drop free of recursion, so nesting
/// depth is bounded by memory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTree {
    objects: Vec<DecodedObject>,
}

impl DecodedTree {
    /// The outermost object
    pub fn root(&self) -> Result<&DecodedObject> {
        self.get(0)
    }

    pub fn get(&self, id: ObjectId) -> Result<&DecodedObject> {
        self.objects
            .get(id)
            .ok_or_else(|| DomError::serialization(format!("no decoded object {}", id)))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// A name and its fields in stream order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    pub name: String,
    pub fields: Vec<DecodedField>,
}

impl DecodedObject {
    pub fn find(&self, name: &str) -> Option<&DecodedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub name: String,
    pub value: DecodedValue,
}

impl DecodedField {
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            DecodedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[ListItem]> {
        match &self.value {
            DecodedValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<ObjectId> {
        match self.value {
            DecodedValue::Object(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Text(String),
    List(Vec<ListItem>),
    Object(ObjectId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Field(DecodedField),
    Object(ObjectId),
}

/// Open structure while decoding
enum Frame {
    /// Reading the fields of an object
    Object(ObjectId),
    /// A list-valued field waiting for its list to close
    Field(String),
    /// Reading list items
    List(Vec<ListItem>),
}

/// Byte cursor over an encoded page
pub struct Deserializer<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    pub fn peek(&self) -> Result<u8> {
        self.data.get(self.index).copied().ok_or_else(|| {
            DomError::serialization(format!("unexpected end of data at byte {}", self.index))
        })
    }

    pub fn read(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.index += 1;
        Ok(b)
    }

    pub fn expect(&mut self, sequence: &[u8]) -> Result<&mut Self> {
        for &expected in sequence {
            let actual = self.peek()?;
            if actual != expected {
                return Err(DomError::serialization(format!(
                    "expected byte {:#04x} at {}, found {:#04x}",
                    expected, self.index, actual
                )));
            }
            self.index += 1;
        }
        Ok(self)
    }

    pub fn is_at_end(&self) -> bool {
        self.index >= self.data.len()
    }

    /// Read `marker` then the escaped UTF-8 run that follows it
    fn read_text(&mut self, marker: u8) -> Result<String> {
        self.expect(&[marker])?;
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                Ok(ESCAPE) => {
                    self.index += 1;
                    let escaped = self.read()?;
                    if !(ESCAPE_OFFSET..ESCAPE_OFFSET + PRINTABLE).contains(&escaped) {
                        return Err(DomError::serialization(format!(
                            "invalid escape {:#04x} at {}",
                            escaped,
                            self.index - 1
                        )));
                    }
                    bytes.push(escaped - ESCAPE_OFFSET);
                }
                Ok(b) if b >= PRINTABLE => {
                    self.index += 1;
                    bytes.push(b);
                }
                // A control byte ends the run; so does the end of the data,
                // which the caller's next structural read reports
                _ => break,
            }
        }
        String::from_utf8(bytes)
            .map_err(|e| DomError::serialization(format!("invalid UTF-8: {}", e)))
    }

    /// Decode one complete object and everything nested in it
    pub fn parse_object(&mut self) -> Result<DecodedTree> {
        let mut tree = DecodedTree::default();
        let root = self.open_object(&mut tree)?;
        let mut stack = vec![Frame::Object(root)];

        loop {
            let in_list = match stack.last() {
                None => break,
                Some(Frame::Object(_)) => false,
                Some(Frame::List(_)) => true,
                Some(Frame::Field(name)) => {
                    return Err(DomError::serialization(format!(
                        "field '{}' lost its list",
                        name
                    )))
                }
            };

            if !in_list {
                match self.peek()? {
                    END_OBJECT => {
                        self.index += 1;
                        stack.pop();
                    }
                    FIELD => self.parse_field(&mut tree, &mut stack)?,
                    other => {
                        return Err(DomError::serialization(format!(
                            "unexpected byte {:#04x} in object at {}",
                            other, self.index
                        )))
                    }
                }
                continue;
            }

            match self.peek()? {
                END_LIST_VALUE => {
                    self.index += 1;
                    let (Some(Frame::List(items)), Some(Frame::Field(name))) =
                        (stack.pop(), stack.pop())
                    else {
                        return Err(DomError::serialization("list closed outside a field"));
                    };
                    attach(
                        &mut tree,
                        &mut stack,
                        DecodedField {
                            name,
                            value: DecodedValue::List(items),
                        },
                    )?;
                }
                FIELD => self.parse_field(&mut tree, &mut stack)?,
                OBJECT => {
                    let id = self.open_object(&mut tree)?;
                    if let Some(Frame::List(items)) = stack.last_mut() {
                        items.push(ListItem::Object(id));
                    }
                    stack.push(Frame::Object(id));
                }
                other => {
                    return Err(DomError::serialization(format!(
                        "unexpected byte {:#04x} in list at {}",
                        other, self.index
                    )))
                }
            }
        }

        Ok(tree)
    }

    fn open_object(&mut self, tree: &mut DecodedTree) -> Result<ObjectId> {
        let name = self.read_text(OBJECT)?;
        tree.objects.push(DecodedObject {
            name,
            fields: Vec::new(),
        });
        Ok(tree.objects.len() - 1)
    }

    /// Read a field name and its value, or open the value if it nests
    fn parse_field(&mut self, tree: &mut DecodedTree, stack: &mut Vec<Frame>) -> Result<()> {
        let name = self.read_text(FIELD)?;
        match self.peek()? {
            TEXT_VALUE => {
                let text = self.read_text(TEXT_VALUE)?;
                attach(
                    tree,
                    stack,
                    DecodedField {
                        name,
                        value: DecodedValue::Text(text),
                    },
                )
            }
            LIST_VALUE => {
                self.index += 1;
                stack.push(Frame::Field(name));
                stack.push(Frame::List(Vec::new()));
                Ok(())
            }
            OBJECT => {
                let id = self.open_object(tree)?;
                attach(
                    tree,
                    stack,
                    DecodedField {
                        name,
                        value: DecodedValue::Object(id),
                    },
                )?;
                stack.push(Frame::Object(id));
                Ok(())
            }
            other => Err(DomError::serialization(format!(
                "field '{}' has no value (found {:#04x} at {})",
                name, other, self.index
            ))),
        }
    }
}

/// Add a finished field to the innermost open object or list
fn attach(tree: &mut DecodedTree, stack: &mut [Frame], field: DecodedField) -> Result<()> {
    match stack.last_mut() {
        Some(Frame::Object(id)) => {
            let id = *id;
            tree.objects[id].fields.push(field);
            Ok(())
        }
        Some(Frame::List(items)) => {
            items.push(ListItem::Field(field));
            Ok(())
        }
        _ => Err(DomError::serialization(format!(
            "field '{}' outside any object",
            field.name
        ))),
    }
}

fn node_attrs(node: &DecodedObject) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    let Some(field) = node.find(ATTR_FIELD) else {
        return Ok(attrs);
    };
    let items = field
        .list()
        .ok_or_else(|| DomError::serialization("'attr' is not a list"))?;
    for item in items {
        match item {
            ListItem::Field(attr) => {
                let value = attr.text().ok_or_else(|| {
                    DomError::serialization(format!("attribute '{}' is not text", attr.name))
                })?;
                attrs.push((attr.name.clone(), value.to_string()));
            }
            ListItem::Object(_) => {
                return Err(DomError::serialization("object inside attribute list"))
            }
        }
    }
    Ok(attrs)
}

fn node_children(node: &DecodedObject) -> Result<Vec<ObjectId>> {
    let Some(field) = node.find(CHILDREN_FIELD) else {
        return Ok(Vec::new());
    };
    let items = field
        .list()
        .ok_or_else(|| DomError::serialization("'children' is not a list"))?;
    items
        .iter()
        .map(|item| match item {
            ListItem::Object(child) => Ok(*child),
            ListItem::Field(_) => Err(DomError::serialization("field inside children list")),
        })
        .collect()
}

/// Replay a decoded node and its subtree as tag events
fn replay_node<S: TagSink>(tree: &DecodedTree, root: ObjectId, sink: &mut S) -> Result<()> {
    enum Step {
        Open(ObjectId),
        Close(ObjectId),
    }

    let mut stack = vec![Step::Open(root)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(id) => {
                let node = tree.get(id)?;
                sink.start_tag(&node.name, node_attrs(node)?)?;
                stack.push(Step::Close(id));
                stack.extend(node_children(node)?.into_iter().rev().map(Step::Open));
            }
            Step::Close(id) => sink.end_tag(&tree.get(id)?.name)?,
        }
    }
    Ok(())
}

/// Decode page bytes and rebuild the page through the parser's tree builder
pub fn deserialize_page(data: &[u8], config: ParserConfig) -> Result<Page> {
    let mut deserializer = Deserializer::new(data);
    let tree = deserializer.parse_object()?;
    let page = tree.root()?;
    if !deserializer.is_at_end() {
        return Err(DomError::serialization(format!(
            "{} trailing bytes after page",
            data.len() - deserializer.index
        )));
    }
    if page.name != PAGE_OBJECT {
        return Err(DomError::serialization(format!(
            "expected a '{}' object, found '{}'",
            PAGE_OBJECT, page.name
        )));
    }

    let text_field = |name: &str| -> Result<String> {
        page.find(name)
            .and_then(DecodedField::text)
            .map(str::to_string)
            .ok_or_else(|| DomError::serialization(format!("page has no '{}' text", name)))
    };
    let title = text_field(TITLE_FIELD)?;
    let address = text_field(ADDRESS_FIELD)?;
    let root = page
        .find(ROOT_FIELD)
        .and_then(DecodedField::object)
        .ok_or_else(|| DomError::serialization("page has no 'root' node"))?;

    let mut builder = TreeBuilder::with_config(config);
    replay_node(&tree, root, &mut builder)?;
    Page::with_title(address, title, builder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;

    const SAMPLE: &str = r#"<html>
<head><title>Sample page</title></head>
<body>
  <h1 id="top">Heading</h1>
  <p class="a" class="b">first line<br>second line</p>
  <p>before<img src="cat.png" alt="cat">after</p>
  <ul><li><a href="one.html">one</a></li><li>two &amp; three</li></ul>
  <hr>
</body>
</html>"#;

    fn parse(address: &str, html: &str) -> Page {
        Page::new(address, parse_document(html, ParserConfig::default()).unwrap()).unwrap()
    }

    fn flatten(page: &Page) -> Vec<(String, Vec<(String, String)>, Vec<String>)> {
        page.find_nodes("*")
            .into_iter()
            .map(|id| {
                let node = page.node(id).unwrap();
                let children = page
                    .arena()
                    .children(id)
                    .unwrap()
                    .iter()
                    .map(|c| c.tag.clone())
                    .collect();
                (node.tag.clone(), node.attrs.to_vec(), children)
            })
            .collect()
    }

    #[test]
    fn test_exact_encoding() {
        let page = parse("a", "<p x=\"1\">hi</p>");
        let bytes = serialize_page(&page).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x00page");
        expected.extend_from_slice(b"\x02title\x03a");
        expected.extend_from_slice(b"\x02address\x03a");
        expected.extend_from_slice(b"\x02root\x00p");
        expected.extend_from_slice(b"\x02attr\x04\x02x\x031\x05");
        expected.extend_from_slice(b"\x02children\x04\x00data\x02attr\x04\x02text\x03hi\x05\x01\x05");
        expected.extend_from_slice(b"\x01\x01");

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_round_trip() {
        let page = parse("http://a.test/sample.html", SAMPLE);
        let bytes = serialize_page(&page).unwrap();
        let decoded = deserialize_page(&bytes, ParserConfig::default()).unwrap();

        assert_eq!(decoded.title(), "Sample page");
        assert_eq!(decoded.address(), "http://a.test/sample.html");
        assert_eq!(flatten(&decoded), flatten(&page));
    }

    #[test]
    fn test_reencoding_is_byte_identical() {
        let page = parse("http://a.test/sample.html", SAMPLE);
        let first = serialize_page(&page).unwrap();
        let decoded = deserialize_page(&first, ParserConfig::default()).unwrap();
        let second = serialize_page(&decoded).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_void_nodes_survive_replay() {
        // The replay sends </img>; it must not pop the paragraph
        let page = parse("a", "<p>x<img src=\"y\">z</p>");
        let bytes = serialize_page(&page).unwrap();
        let decoded = deserialize_page(&bytes, ParserConfig::default()).unwrap();

        let p = decoded.find_nodes("p")[0];
        let children: Vec<_> = decoded
            .arena()
            .children(p)
            .unwrap()
            .iter()
            .map(|c| c.tag.clone())
            .collect();
        assert_eq!(children, vec!["data", "img", "data"]);
    }

    #[test]
    fn test_control_bytes_are_escaped() {
        let page = parse("a", "<p>line one<br>line\u{1}two</p>");
        let bytes = serialize_page(&page).unwrap();

        // Text must not leak raw control bytes into the stream
        assert!(!bytes.windows(2).any(|w| w == b"e\n"));
        assert!(bytes.windows(2).any(|w| w == [ESCAPE, b'\n' | ESCAPE_OFFSET]));

        let decoded = deserialize_page(&bytes, ParserConfig::default()).unwrap();
        let data = decoded.find_nodes("data")[0];
        assert_eq!(decoded.node(data).unwrap().text(), Some("line one\nline\u{1}two"));
    }

    #[test]
    fn test_truncated_data_fails() {
        let page = parse("a", SAMPLE);
        let bytes = serialize_page(&page).unwrap();

        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            let result = deserialize_page(&bytes[..cut], ParserConfig::default());
            assert!(matches!(result, Err(DomError::SerializationError(_))), "cut at {}", cut);
        }
    }

    #[test]
    fn test_wrong_object_name_fails() {
        let mut serializer = PageSerializer::new();
        serializer.object("book").field("title").text("x").end_object();
        let result = deserialize_page(&serializer.into_bytes(), ParserConfig::default());
        assert!(matches!(result, Err(DomError::SerializationError(_))));
    }

    #[test]
    fn test_missing_root_fails() {
        let mut serializer = PageSerializer::new();
        serializer
            .object("page")
            .field("title")
            .text("t")
            .field("address")
            .text("a")
            .end_object();
        let result = deserialize_page(&serializer.into_bytes(), ParserConfig::default());
        assert!(matches!(result, Err(DomError::SerializationError(_))));
    }

    #[test]
    fn test_trailing_bytes_fail() {
        let page = parse("a", "<p>x</p>");
        let mut bytes = serialize_page(&page).unwrap();
        bytes.push(END_OBJECT);
        let result = deserialize_page(&bytes, ParserConfig::default());
        assert!(matches!(result, Err(DomError::SerializationError(_))));
    }

    #[test]
    fn test_bad_escape_fails() {
        let data = [OBJECT, b'p', ESCAPE, b'!', END_OBJECT];
        let result = Deserializer::new(&data).parse_object();
        assert!(matches!(result, Err(DomError::SerializationError(_))));
    }

    #[test]
    fn test_generic_tree() {
        let mut serializer = PageSerializer::new();
        serializer
            .object("thing")
            .field("name")
            .text("n")
            .field("items")
            .start_list()
            .object("a")
            .end_object()
            .end_list()
            .end_object();
        let bytes = serializer.into_bytes();

        let tree = Deserializer::new(&bytes).parse_object().unwrap();
        let object = tree.root().unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(object.name, "thing");
        assert_eq!(object.find("name").and_then(DecodedField::text), Some("n"));
        assert!(object.find("missing").is_none());

        let items = object.find("items").and_then(DecodedField::list).unwrap();
        assert_eq!(items, &[ListItem::Object(1)]);
        assert_eq!(tree.get(1).unwrap().name, "a");
    }

    #[test]
    fn test_nested_lists_keep_field_order() {
        let mut serializer = PageSerializer::new();
        serializer
            .object("outer")
            .field("first")
            .start_list()
            .field("inner")
            .start_list()
            .field("k")
            .text("v")
            .end_list()
            .end_list()
            .field("last")
            .text("z")
            .end_object();
        let bytes = serializer.into_bytes();

        let tree = Deserializer::new(&bytes).parse_object().unwrap();
        let names: Vec<_> = tree.root().unwrap().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first", "last"]);

        let first = tree.root().unwrap().find("first").and_then(DecodedField::list).unwrap();
        let ListItem::Field(inner) = &first[0] else {
            panic!("expected a field, got {:?}", first[0]);
        };
        assert_eq!(inner.name, "inner");
        assert_eq!(inner.list().map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_deeply_nested_page() {
        let depth = 20_000;
        let html = format!("{}x{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let page = parse("http://a.test/deep", &html);

        let bytes = serialize_page(&page).unwrap();
        let decoded = deserialize_page(&bytes, ParserConfig::default()).unwrap();
        assert_eq!(decoded.arena().len(), depth + 1);
        assert_eq!(serialize_page(&decoded).unwrap(), bytes);

        // A hostile stream that only opens objects is an error, not a crash
        let mut hostile = PageSerializer::new();
        hostile.object("page").field("root");
        for _ in 0..depth {
            hostile.object("div").field(CHILDREN_FIELD).start_list();
        }
        let result = deserialize_page(&hostile.into_bytes(), ParserConfig::default());
        assert!(matches!(result, Err(DomError::SerializationError(_))));
    }
}
