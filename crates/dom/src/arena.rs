//! Arena-based document tree storage
//!
//! Nodes live in one `Vec` and refer to each other by `NodeId`. The parent
//! link is a plain index, so there is no reference cycle to break when a
//! page goes away: dropping or clearing the arena is the whole teardown.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<DomNode>
//!        [Node0][Node1][Node2]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```

use crate::error::{DomError, Result};
use crate::types::{Attributes, DomNode, NodeId};

#[derive(Debug, Clone)]
pub struct DomArena {
    /// All nodes stored sequentially, in creation order
    nodes: Vec<DomNode>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root_id: None,
        }
    }

    /// Create a node and append it to `parent`'s children, returns its ID
    pub fn add_node(
        &mut self,
        tag: &str,
        attrs: Attributes,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let node_id = self.nodes.len() as NodeId;
        let mut node = DomNode::new(node_id, tag, attrs);

        if let Some(parent_id) = parent {
            self.get_mut(parent_id)?.children_ids.push(node_id);
            node.parent_id = Some(parent_id);
        }

        self.nodes.push(node);
        Ok(node_id)
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Get root node
    pub fn root(&self) -> Result<&DomNode> {
        let root_id = self.root_id.ok_or(DomError::EmptyDocument)?;
        self.get(root_id)
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterator over all nodes, in creation order
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter()
    }

    /// Get children of a node
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&DomNode>> {
        let node = self.get(node_id)?;
        node.children_ids
            .iter()
            .map(|&child_id| self.get(child_id))
            .collect()
    }

    /// Get parent of a node
    pub fn parent(&self, node_id: NodeId) -> Result<Option<&DomNode>> {
        let node = self.get(node_id)?;
        match node.parent_id {
            Some(parent_id) => Ok(Some(self.get(parent_id)?)),
            None => Ok(None),
        }
    }

    /// Traverse tree depth-first, pre-order (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// All nodes under (and including) `start_id` matching `selector`, pre-order
    pub fn find_nodes(&self, start_id: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let mut result = Vec::new();
        self.traverse_df(start_id, |node| {
            if node.matches(selector) {
                result.push(node.node_id);
            }
            Ok(())
        })?;
        Ok(result)
    }

    /// Apply a chain of selectors; each stage searches under the previous stage's results
    pub fn find_children(&self, start_id: NodeId, selectors: &[&str]) -> Result<Vec<NodeId>> {
        let mut result = vec![start_id];
        for selector in selectors {
            let mut scratch = Vec::new();
            for &node_id in &result {
                scratch.extend(self.find_nodes(node_id, selector)?);
            }
            result = scratch;
        }
        Ok(result)
    }

    /// Drop every node. Parent links are indices, so nothing outlives this.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root_id = None;
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomArena, NodeId) {
        // html -> [body -> [p -> [data], p], title -> [data]]
        let mut arena = DomArena::new();
        let html = arena.add_node("html", Attributes::new(), None).unwrap();
        arena.set_root(html).unwrap();
        let body = arena.add_node("body", Attributes::new(), Some(html)).unwrap();
        let p1 = arena.add_node("p", Attributes::new(), Some(body)).unwrap();
        arena
            .add_node(
                "data",
                smallvec::smallvec![("text".to_string(), "one".to_string())],
                Some(p1),
            )
            .unwrap();
        arena.add_node("p", Attributes::new(), Some(body)).unwrap();
        let title = arena.add_node("title", Attributes::new(), Some(html)).unwrap();
        arena
            .add_node(
                "data",
                smallvec::smallvec![("text".to_string(), "Hello".to_string())],
                Some(title),
            )
            .unwrap();
        (arena, html)
    }

    #[test]
    fn test_arena_basic() {
        let mut arena = DomArena::new();
        let id = arena.add_node("div", Attributes::new(), None).unwrap();
        assert_eq!(id, 0);

        let child = arena.add_node("span", Attributes::new(), Some(id)).unwrap();
        assert_eq!(arena.get(child).unwrap().parent_id, Some(id));
        assert_eq!(arena.parent(child).unwrap().unwrap().tag, "div");
        assert_eq!(arena.children(id).unwrap().len(), 1);
    }

    #[test]
    fn test_add_to_missing_parent() {
        let mut arena = DomArena::new();
        assert!(matches!(
            arena.add_node("p", Attributes::new(), Some(7)),
            Err(DomError::NodeNotFound(7))
        ));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_traverse_df() {
        let (arena, root) = sample();

        let mut visited = Vec::new();
        arena
            .traverse_df(root, |node| {
                visited.push(node.tag.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, vec!["html", "body", "p", "data", "p", "title", "data"]);
    }

    #[test]
    fn test_find_nodes_and_chain() {
        let (arena, root) = sample();

        assert_eq!(arena.find_nodes(root, "p").unwrap().len(), 2);
        assert_eq!(arena.find_nodes(root, "*").unwrap().len(), 7);

        let titles = arena.find_children(root, &["title", "data"]).unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(arena.get(titles[0]).unwrap().text(), Some("Hello"));
    }

    #[test]
    fn test_clear() {
        let (mut arena, _) = sample();
        arena.clear();
        assert!(arena.is_empty());
        assert!(arena.root_id().is_none());
        assert!(matches!(arena.root(), Err(DomError::EmptyDocument)));
    }
}
