//! Template syntax tree

use apiary_schema::Value;

/// A node of a parsed template body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text copied to the output
    Text(String),

    /// `{{pipeline}}`: prints the result unless the pipeline declares variables
    Output(Pipeline),

    /// `{{if}} ... {{else if}} ... {{else}} ... {{end}}`
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },

    /// `{{range}} ... {{else}} ... {{end}}`
    Range {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },

    /// `{{with}} ... {{else}} ... {{end}}`
    With {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
}

/// Commands joined by `|`, optionally declaring variables
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    /// Declared or assigned variable names, without the `$`
    pub vars: Vec<String>,

    /// `:=` declares new variables, `=` assigns existing ones
    pub declare: bool,

    pub commands: Vec<Command>,
}

/// A function call or a single operand
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Operand>,
}

/// An argument inside a command
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// String, number, boolean or nil constant
    Literal(Value),

    /// `.`
    Dot,

    /// `.a.b` relative to dot
    Field(Vec<String>),

    /// `$name`; the empty name is the root data
    Variable(String),

    /// Function name
    Call(String),

    /// `(pipeline)`
    Pipeline(Box<Pipeline>),

    /// Field access on the result of another operand, e.g. `$x.a` or `(index . 0).b`
    Chain(Box<Operand>, Vec<String>),
}
