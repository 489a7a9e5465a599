use super::literal::{LiteralError, parse_literal};
use super::value::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    /// Surface syntax of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation: `!x`
    Not,
    /// Arithmetic negation: `-x`
    Neg,
}

/// Abstract syntax tree node.
///
/// This is the contract between the (external) parser and the code
/// generator. Expressions and statements share one type; the generator
/// decides what each position allows.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ───────────────────────────── Expressions ──────────────────────────
    /// A literal value.
    ///
    /// Stack effect: `( -- x )`
    Literal(Value),

    /// Read a variable from the active frame.
    ///
    /// Stack effect: `( -- x )`
    Identifier(String),

    /// Binary expression; `left` is evaluated first.
    ///
    /// Stack effect: `( -- left⊕right )`
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// Unary expression.
    Unary { op: UnaryOp, operand: Box<Node> },

    /// Call a user function or a builtin. Arguments are evaluated left to
    /// right.
    Call { callee: String, args: Vec<Node> },

    // ───────────────────────────── Statements ───────────────────────────
    /// Identifier with initializer: `name = value`.
    Assign { name: String, value: Box<Node> },

    /// Statement sequence.
    Block(Vec<Node>),

    /// Conditional with optional else branch.
    If {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },

    /// Pre-test loop: `while condition { body }`.
    While { condition: Box<Node>, body: Box<Node> },

    /// Post-test loop: `do { body } while condition`.
    DoWhile { body: Box<Node>, condition: Box<Node> },

    /// Counted loop: `for var in range(start, end) { body }`.
    ///
    /// `end` is exclusive and re-evaluated before every iteration.
    For {
        var: String,
        start: Box<Node>,
        end: Box<Node>,
        body: Box<Node>,
    },

    // ──────────────────────────── Functions ─────────────────────────────
    /// Function declaration. Only allowed at the top level of a program.
    Function {
        name: String,
        params: Vec<String>,
        body: Box<Node>,
    },

    /// Return the value of an expression to the caller.
    Return(Box<Node>),
}

impl Node {
    /// Build a literal node from its source text.
    pub fn literal_from_source(text: &str) -> Result<Node, LiteralError> {
        parse_literal(text).map(Node::Literal)
    }

    pub fn int(n: i64) -> Node {
        Node::Literal(Value::Int(n))
    }

    pub fn float(n: f64) -> Node {
        Node::Literal(Value::Float(n))
    }

    pub fn string(s: impl Into<String>) -> Node {
        Node::Literal(Value::Str(s.into()))
    }

    pub fn boolean(b: bool) -> Node {
        Node::Literal(Value::Bool(b))
    }

    pub fn ident(name: impl Into<String>) -> Node {
        Node::Identifier(name.into())
    }

    pub fn assign(name: impl Into<String>, value: Node) -> Node {
        Node::Assign {
            name: name.into(),
            value: Box::new(value),
        }
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Node {
        Node::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Node>) -> Node {
        Node::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn if_else(condition: Node, then_branch: Node, else_branch: Option<Node>) -> Node {
        Node::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }
    }

    pub fn while_loop(condition: Node, body: Node) -> Node {
        Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
        }
    }

    pub fn do_while(body: Node, condition: Node) -> Node {
        Node::DoWhile {
            body: Box::new(body),
            condition: Box::new(condition),
        }
    }

    pub fn for_range(var: impl Into<String>, start: Node, end: Node, body: Node) -> Node {
        Node::For {
            var: var.into(),
            start: Box::new(start),
            end: Box::new(end),
            body: Box::new(body),
        }
    }

    pub fn function(name: impl Into<String>, params: &[&str], body: Node) -> Node {
        Node::Function {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        }
    }

    pub fn ret(value: Node) -> Node {
        Node::Return(Box::new(value))
    }

    /// Short human-readable name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Literal(v) => match v {
                Value::Int(_) => "integer literal",
                Value::Float(_) => "float literal",
                Value::Str(_) => "string literal",
                Value::Bool(_) => "bool literal",
                Value::Nil => "nil literal",
            },
            Node::Identifier(_) => "identifier",
            Node::Binary { .. } => "binary expression",
            Node::Unary { .. } => "unary expression",
            Node::Call { .. } => "call",
            Node::Assign { .. } => "assignment",
            Node::Block(_) => "block",
            Node::If { .. } => "if",
            Node::While { .. } => "while",
            Node::DoWhile { .. } => "do-while",
            Node::For { .. } => "for",
            Node::Function { .. } => "function",
            Node::Return(_) => "return",
        }
    }
}
