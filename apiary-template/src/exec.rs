//! Template execution

use crate::ast::{Command, Node, Operand, Pipeline};
use crate::error::{Result, TemplateError};
use crate::funcs::{self, FuncMap};
use apiary_schema::Value;
use std::fmt::Write;

/// Nesting limit for `(pipeline)` and block evaluation
const MAX_DEPTH: usize = 100;

/// Execution state for one render
pub(crate) struct Exec<'a> {
    funcs: &'a FuncMap,
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'a> Exec<'a> {
    pub(crate) fn new(funcs: &'a FuncMap, root: &Value) -> Self {
        Self {
            funcs,
            vars: vec![(String::new(), root.clone())],
            depth: 0,
        }
    }

    pub(crate) fn walk(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<()> {
        self.enter()?;
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(pipeline) => {
                    let value = self.pipeline(pipeline, dot)?;
                    if pipeline.vars.is_empty() {
                        write!(out, "{}", value).map_err(|e| TemplateError::exec(e.to_string()))?;
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => self.if_node(branches, otherwise.as_deref(), dot, out)?,
                Node::With {
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let value = self.pipeline(pipeline, dot)?;
                    if value.is_truthy() {
                        self.walk(body, &value, out)?;
                    } else if let Some(otherwise) = otherwise {
                        self.walk(otherwise, dot, out)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::Range {
                    pipeline,
                    body,
                    otherwise,
                } => self.range_node(pipeline, body, otherwise.as_deref(), dot, out)?,
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(TemplateError::exec("exceeded maximum template depth"));
        }
        Ok(())
    }

    fn if_node(
        &mut self,
        branches: &[(Pipeline, Vec<Node>)],
        otherwise: Option<&[Node]>,
        dot: &Value,
        out: &mut String,
    ) -> Result<()> {
        let mark = self.vars.len();
        for (condition, body) in branches {
            if self.pipeline(condition, dot)?.is_truthy() {
                self.walk(body, dot, out)?;
                self.vars.truncate(mark);
                return Ok(());
            }
        }
        if let Some(otherwise) = otherwise {
            self.walk(otherwise, dot, out)?;
        }
        self.vars.truncate(mark);
        Ok(())
    }

    fn range_node(
        &mut self,
        pipeline: &Pipeline,
        body: &[Node],
        otherwise: Option<&[Node]>,
        dot: &Value,
        out: &mut String,
    ) -> Result<()> {
        let value = self.commands(pipeline, dot)?;
        let entries: Vec<(Value, Value)> = match value {
            Value::Null => Vec::new(),
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item))
                .collect(),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            Value::Int(n) => (0..n.max(0)).map(|i| (Value::Int(i), Value::Int(i))).collect(),
            other => {
                return Err(TemplateError::type_mismatch(
                    "range",
                    "list, map or int",
                    other.type_name(),
                ))
            }
        };

        if entries.is_empty() {
            if let Some(otherwise) = otherwise {
                self.walk(otherwise, dot, out)?;
            }
            return Ok(());
        }

        for (key, item) in entries {
            let mark = self.vars.len();
            match pipeline.vars.as_slice() {
                [] => {}
                [elem] => self.vars.push((elem.clone(), item.clone())),
                [index, elem, ..] => {
                    self.vars.push((index.clone(), key));
                    self.vars.push((elem.clone(), item.clone()));
                }
            }
            self.walk(body, &item, out)?;
            self.vars.truncate(mark);
        }
        Ok(())
    }

    /// Evaluate a pipeline and bind its variables
    fn pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value> {
        let value = self.commands(pipeline, dot)?;

        for name in &pipeline.vars {
            if pipeline.declare {
                self.vars.push((name.clone(), value.clone()));
            } else {
                let slot = self
                    .vars
                    .iter_mut()
                    .rev()
                    .find(|(n, _)| n == name)
                    .ok_or_else(|| TemplateError::exec(format!("undefined variable ${}", name)))?;
                slot.1 = value.clone();
            }
        }
        Ok(value)
    }

    /// Evaluate the commands of a pipeline, feeding each result to the next
    fn commands(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value> {
        self.enter()?;
        let mut last = None;
        for command in &pipeline.commands {
            last = Some(self.command(command, dot, last.take())?);
        }
        self.depth -= 1;
        Ok(last.unwrap_or_default())
    }

    fn command(&mut self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
        let (first, rest) = command
            .args
            .split_first()
            .ok_or_else(|| TemplateError::exec("empty command"))?;

        match first {
            Operand::Call(name) => self.call(name, rest, dot, piped),
            operand => {
                if !rest.is_empty() || piped.is_some() {
                    return Err(TemplateError::exec(format!(
                        "can't give argument to non-function {}",
                        describe(operand)
                    )));
                }
                self.operand(operand, dot)
            }
        }
    }

    fn call(
        &mut self,
        name: &str,
        args: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value> {
        // and/or evaluate lazily and return the deciding operand
        if name == "and" || name == "or" {
            let want = name == "or";
            if args.is_empty() && piped.is_none() {
                return Err(TemplateError::arg_count(name, "at least 1", 0));
            }
            let mut last = Value::Null;
            for arg in args {
                let value = self.operand(arg, dot)?;
                if value.is_truthy() == want {
                    return Ok(value);
                }
                last = value;
            }
            return Ok(piped.unwrap_or(last));
        }

        let funcs = self.funcs;
        let func = funcs
            .get(name)
            .ok_or_else(|| TemplateError::UnknownFunction(name.to_string()))?;

        let mut values = Vec::with_capacity(args.len() + 1);
        for arg in args {
            values.push(self.operand(arg, dot)?);
        }
        values.extend(piped);
        (**func)(&values)
    }

    fn operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => funcs::resolve(dot, path),
            Operand::Variable(name) => self
                .vars
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| TemplateError::exec(format!("undefined variable ${}", name))),
            Operand::Call(name) => self.call(name, &[], dot, None),
            Operand::Pipeline(pipeline) => self.pipeline(pipeline, dot),
            Operand::Chain(base, path) => {
                let value = self.operand(base, dot)?;
                funcs::resolve(&value, path)
            }
        }
    }
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Literal(value) => format!("{:?}", value),
        Operand::Dot => ".".to_string(),
        Operand::Field(path) => format!(".{}", path.join(".")),
        Operand::Variable(name) => format!("${}", name),
        Operand::Call(name) => name.clone(),
        Operand::Pipeline(_) => "(pipeline)".to_string(),
        Operand::Chain(base, path) => format!("{}.{}", describe(base), path.join(".")),
    }
}
