use super::node::Node;

/// Parsed program: the top-level statement sequence.
///
/// Function declarations may be interleaved with ordinary statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Node>,
}

impl Program {
    pub fn new(statements: Vec<Node>) -> Self {
        Self { statements }
    }

    /// Top-level function declarations, in source order.
    pub fn functions(&self) -> impl Iterator<Item = &Node> {
        self.statements
            .iter()
            .filter(|node| matches!(node, Node::Function { .. }))
    }
}
