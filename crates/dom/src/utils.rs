//! Utility functions for text handling

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::NodeId;

/// True when `text` has nothing but whitespace in it
pub fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

/// Collapse every run of ASCII whitespace into a single space
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;

    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }

    out
}

/// Concatenated text of every data node under `node_id`
pub fn get_text_content(arena: &DomArena, node_id: NodeId) -> Result<String> {
    let mut text = String::new();

    arena.traverse_df(node_id, |node| {
        if let Some(value) = node.text() {
            text.push_str(value);
        }
        Ok(())
    })?;

    Ok(text)
}
