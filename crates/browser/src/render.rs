//! Plain-text rendering of a page
//!
//! Layout comes from `TagKind::layout()`: hidden subtrees are skipped, block
//! nodes start and end on their own line, inline nodes flow. Anchors with an
//! `href` get a `[n]` marker whose index matches `Page::links()`.

use dom::{DomArena, Layout, NodeId, Page, TagKind};

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub link_markers: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { link_markers: true }
    }
}

pub fn render_text(page: &Page, options: RenderOptions) -> Result<String> {
    let mut renderer = Renderer {
        arena: page.arena(),
        options,
        out: String::new(),
        next_link: 0,
    };
    if let Some(root_id) = page.root_id() {
        renderer.render(root_id)?;
    }

    let mut text = renderer.out.trim_end().to_string();
    text.push('\n');
    Ok(text)
}

struct Renderer<'a> {
    arena: &'a DomArena,
    options: RenderOptions,
    out: String,
    next_link: usize,
}

enum Visit {
    Enter(NodeId),
    Leave(NodeId),
}

impl Renderer<'_> {
    /// Render `root_id` and its subtree, depth-first with an explicit stack
    fn render(&mut self, root_id: NodeId) -> Result<()> {
        let mut stack = vec![Visit::Enter(root_id)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node_id) => {
                    if self.enter(node_id)? {
                        stack.push(Visit::Leave(node_id));
                        let children = &self.arena.get(node_id)?.children_ids;
                        stack.extend(children.iter().rev().map(|&id| Visit::Enter(id)));
                    }
                }
                Visit::Leave(node_id) => self.leave(node_id)?,
            }
        }
        Ok(())
    }

    /// Emit what comes before the children; `false` skips the subtree
    fn enter(&mut self, node_id: NodeId) -> Result<bool> {
        let node = self.arena.get(node_id)?;

        match node.kind.layout() {
            Layout::Hidden => return Ok(false),
            Layout::LineBreak => {
                self.newline();
                return Ok(false);
            }
            Layout::Block => self.end_line(),
            Layout::Inline => {}
        }

        match node.kind {
            TagKind::Data => {
                if let Some(text) = node.text() {
                    self.push(text);
                }
            }
            TagKind::Heading(level) => self.push(&format!("{} ", "#".repeat(level as usize))),
            TagKind::ListItem => self.push("* "),
            TagKind::Rule => self.push("----"),
            TagKind::Image => match node.get_attr("alt").filter(|alt| !alt.trim().is_empty()) {
                Some(alt) => self.push(&format!("[{}]", alt)),
                None => self.push("[image]"),
            },
            _ => {}
        }
        Ok(true)
    }

    fn leave(&mut self, node_id: NodeId) -> Result<()> {
        let node = self.arena.get(node_id)?;

        if node.kind == TagKind::Anchor && node.get_attr("href").is_some() {
            if self.options.link_markers {
                self.push(&format!("[{}]", self.next_link));
            }
            self.next_link += 1;
        }

        if node.kind.layout() == Layout::Block {
            self.end_line();
        }
        Ok(())
    }

    /// Append inline text; leading spaces vanish at the start of a line
    fn push(&mut self, text: &str) {
        let at_line_start = self.out.is_empty() || self.out.ends_with('\n');
        let text = if at_line_start {
            text.trim_start_matches(' ')
        } else {
            text
        };
        if text.starts_with(' ') && self.out.ends_with(' ') {
            self.out.push_str(&text[1..]);
        } else {
            self.out.push_str(text);
        }
    }

    fn newline(&mut self) {
        let keep = self.out.trim_end_matches(' ').len();
        self.out.truncate(keep);
        self.out.push('\n');
    }

    /// Finish the current line unless already at the start of one
    fn end_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.newline();
        }
    }
}
