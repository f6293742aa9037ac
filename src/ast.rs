use crate::error::SourceLocation;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    StringLiteral(String),
    IntegerLiteral(i64),
    BoolLiteral(bool),
    Dot,
    Field(Vec<String>),
    Variable { name: String, path: Vec<String> },
    Function(String),
    Pipeline(Box<Pipeline>), // parenthesised
}

/// One stage of a pipeline: an operand, or a function applied to arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Expression>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Pipeline,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<Branch>, // `if` followed by every `else if`
        else_body: Option<Vec<Node>>,
    },
    Range {
        key: Option<String>,
        value: Option<String>,
        pipeline: Pipeline,
        body: Vec<Node>,
        else_body: Option<Vec<Node>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}
