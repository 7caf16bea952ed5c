//! HTML tokenization and tree building
//!
//! html5ever's tokenizer turns HTML text into start-tag / end-tag / text
//! events and [`Tokenizer`] hands them to a [`TagSink`]. [`TreeBuilder`] is
//! the sink that builds the arena. The binary page decoder drives the same
//! sink, so a deserialized page goes through exactly the node-construction
//! path a parsed one does.
//!
//! ```text
//! HTML text ──► Tokenizer ──┐
//!                           ├──► TagSink (TreeBuilder) ──► DomArena
//! page bytes ──► Decoder ───┘
//! ```

use std::cell::RefCell;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind as TokenKind, Token, TokenSink, TokenSinkResult,
    Tokenizer as HtmlTokenizer, TokenizerOpts,
};
use html5ever::TokenizerResult;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{is_void_tag, Attributes, NodeId, DATA_TAG, TEXT_ATTR};
use crate::utils::{collapse_whitespace, is_blank};

/// Consumer of tag events
pub trait TagSink {
    fn start_tag(&mut self, tag: &str, attrs: Vec<(String, String)>) -> Result<()>;

    fn end_tag(&mut self, tag: &str) -> Result<()>;

    fn text(&mut self, text: &str) -> Result<()>;
}

/// Tokenizer state to switch to after a start tag whose content is not markup
fn raw_kind(tag: &str) -> Option<RawKind> {
    match tag {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        _ => None,
    }
}

/// Tokenizes a complete HTML document into a [`TagSink`]
///
/// Character references, comments, doctypes and attribute syntax are
/// html5ever's business. Text is buffered until the next tag so a run split
/// across several character tokens reaches the sink as one event.
pub struct Tokenizer<'a> {
    input: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input }
    }

    /// Tokenize the whole input into `sink`, stopping at the first sink error
    pub fn run<S: TagSink>(self, sink: &mut S) -> Result<()> {
        let bridge = TokenBridge {
            state: RefCell::new(BridgeState {
                sink,
                pending: String::new(),
                error: None,
            }),
        };

        let mut tokenizer = HtmlTokenizer::new(bridge, TokenizerOpts::default());
        let mut input = BufferQueue::default();
        input.push_back(StrTendril::from_slice(self.input));
        while !matches!(tokenizer.feed(&mut input), TokenizerResult::Done) {}
        tokenizer.end();

        let error = tokenizer.sink.state.borrow_mut().error.take();
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Adapts html5ever tokens to `TagSink` calls
struct TokenBridge<'s, S> {
    state: RefCell<BridgeState<'s, S>>,
}

struct BridgeState<'s, S> {
    sink: &'s mut S,
    /// Character data seen since the last tag
    pending: String,
    /// First sink failure; everything after it is dropped
    error: Option<DomError>,
}

impl<S: TagSink> BridgeState<'_, S> {
    fn flush_text(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.pending);
        self.sink.text(&text)
    }

    fn tag(&mut self, tag: Tag) -> Result<Option<RawKind>> {
        self.flush_text()?;
        let name: &str = &tag.name;

        match tag.kind {
            TokenKind::StartTag => {
                let attrs = tag
                    .attrs
                    .iter()
                    .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                    .collect();
                self.sink.start_tag(name, attrs)?;

                // `<br/>` is just `<br>`; only non-void self-closing tags close
                if tag.self_closing {
                    if !is_void_tag(name) {
                        self.sink.end_tag(name)?;
                    }
                    return Ok(None);
                }
                Ok(raw_kind(name))
            }
            TokenKind::EndTag => {
                self.sink.end_tag(name)?;
                Ok(None)
            }
        }
    }

    fn token(&mut self, token: Token) -> Result<Option<RawKind>> {
        match token {
            Token::TagToken(tag) => self.tag(tag),
            Token::CharacterTokens(text) => {
                self.pending.push_str(&text);
                Ok(None)
            }
            Token::EOFToken => {
                self.flush_text()?;
                Ok(None)
            }
            Token::ParseError(message) => {
                tracing::trace!("html: {}", message);
                Ok(None)
            }
            // Comments, doctypes and NUL characters carry nothing we keep
            _ => Ok(None),
        }
    }
}

impl<S: TagSink> TokenSink for TokenBridge<'_, S> {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        if state.error.is_some() {
            return TokenSinkResult::Continue;
        }

        let outcome = state.token(token);
        match outcome {
            Ok(Some(kind)) => TokenSinkResult::RawData(kind),
            Ok(None) => TokenSinkResult::Continue,
            Err(e) => {
                state.error = Some(e);
                TokenSinkResult::Continue
            }
        }
    }
}

/// Parser configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserConfig {
    /// Fail on end tags that do not close the current element
    pub strict: bool,
}

/// Builds a `DomArena` from tag events
///
/// Nesting rules:
/// - A start tag appends to the current parent; non-void tags become the new parent
/// - The first node is the root; a start tag with no open parent stays detached
/// - An end tag pops back to the parent; void end tags are ignored
/// - Text becomes a synthetic `data` node with a single `text` attribute
/// - `<br>` right after text extends that text with a newline instead of adding a node
pub struct TreeBuilder {
    arena: DomArena,
    parent: Option<NodeId>,
    /// Data node created by the last `text` event, while nothing else has happened since
    last_text: Option<NodeId>,
    config: ParserConfig,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            arena: DomArena::new(),
            parent: None,
            last_text: None,
            config,
        }
    }

    /// Finish building; fails if no node was ever created
    pub fn finish(self) -> Result<DomArena> {
        if self.arena.root_id().is_none() {
            return Err(DomError::EmptyDocument);
        }
        Ok(self.arena)
    }

    fn open(&mut self, tag: &str, attrs: Attributes) -> Result<NodeId> {
        // Top-level content after the root closed stays detached from it
        if self.parent.is_none() && self.arena.root_id().is_some() {
            tracing::debug!("<{}> has no open parent, leaving it detached", tag);
        }

        let node_id = self.arena.add_node(tag, attrs, self.parent)?;
        if self.arena.root_id().is_none() {
            self.arena.set_root(node_id)?;
        }
        if !is_void_tag(tag) {
            self.parent = Some(node_id);
        }
        Ok(node_id)
    }

    /// Append a line break to the last text run, if there is one to extend
    fn extend_with_break(&mut self) -> Result<bool> {
        let Some(node_id) = self.last_text else {
            return Ok(false);
        };
        if let Some(text) = self.arena.get_mut(node_id)?.attr_mut(TEXT_ATTR) {
            let keep = text.trim_end_matches(' ').len();
            text.truncate(keep);
            text.push('\n');
            return Ok(true);
        }
        Ok(false)
    }

    /// Continue a text run that ended in a merged `<br>`
    fn extend_after_break(&mut self, collapsed: &str) -> Result<bool> {
        let Some(node_id) = self.last_text else {
            return Ok(false);
        };
        if let Some(text) = self.arena.get_mut(node_id)?.attr_mut(TEXT_ATTR) {
            if text.ends_with('\n') {
                text.push_str(collapsed.trim_start_matches(' '));
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TagSink for TreeBuilder {
    fn start_tag(&mut self, tag: &str, attrs: Vec<(String, String)>) -> Result<()> {
        if tag == "br" && self.extend_with_break()? {
            return Ok(());
        }
        self.last_text = None;
        self.open(tag, Attributes::from_vec(attrs))?;
        Ok(())
    }

    fn end_tag(&mut self, tag: &str) -> Result<()> {
        // A void end tag closes nothing, so a `<br>` merge stays open
        if is_void_tag(tag) {
            return Ok(());
        }
        self.last_text = None;

        let Some(current) = self.parent else {
            if self.config.strict {
                return Err(DomError::ParseError(format!(
                    "</{}> with no open element",
                    tag
                )));
            }
            tracing::debug!("ignoring </{}> with no open element", tag);
            return Ok(());
        };

        let node = self.arena.get(current)?;
        if node.tag == tag {
            self.parent = node.parent_id;
            return Ok(());
        }

        if self.config.strict {
            return Err(DomError::ParseError(format!(
                "</{}> does not close <{}>",
                tag, node.tag
            )));
        }

        // Best effort: close the nearest open ancestor with this tag
        let mut cursor = node.parent_id;
        while let Some(id) = cursor {
            let ancestor = self.arena.get(id)?;
            if ancestor.tag == tag {
                self.parent = ancestor.parent_id;
                return Ok(());
            }
            cursor = ancestor.parent_id;
        }

        tracing::debug!("ignoring unmatched </{}>", tag);
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if is_blank(text) {
            return Ok(());
        }

        let collapsed = collapse_whitespace(text);
        if self.extend_after_break(&collapsed)? {
            return Ok(());
        }

        self.start_tag(DATA_TAG, vec![(TEXT_ATTR.to_string(), collapsed)])?;
        let node_id = (self.arena.len() - 1) as NodeId;
        self.end_tag(DATA_TAG)?;
        self.last_text = Some(node_id);
        Ok(())
    }
}

/// Parse a complete HTML document into an arena
pub fn parse_document(html: &str, config: ParserConfig) -> Result<DomArena> {
    let mut builder = TreeBuilder::with_config(config);
    Tokenizer::new(html).run(&mut builder)?;
    builder.finish()
}
