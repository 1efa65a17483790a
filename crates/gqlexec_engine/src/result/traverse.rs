//! Depth-first traversal of result trees.

use super::ExecutionResultNode;

/// Callbacks for a depth-first walk.
///
/// There is no built-in way to stop early; a visitor that wants to stop keeps its own
/// flag and ignores the remaining calls.
pub trait NodeVisitor {
    /// Called before the node's children are visited.
    fn enter(&mut self, _node: &ExecutionResultNode) {}

    /// Called after the node's children were visited.
    fn leave(&mut self, _node: &ExecutionResultNode) {}
}

/// Visits `root` and then, recursively, its children in order.
pub fn depth_first<V: NodeVisitor + ?Sized>(visitor: &mut V, root: &ExecutionResultNode) {
    visitor.enter(root);
    for child in root.children() {
        depth_first(visitor, child);
    }
    visitor.leave(root);
}

/// Visits every tree of `roots` in order.
pub fn depth_first_forest<V: NodeVisitor + ?Sized>(visitor: &mut V, roots: &[ExecutionResultNode]) {
    for root in roots {
        depth_first(visitor, root);
    }
}
