//! Template parser using Pest
//!
//! Parsing happens in two passes: the grammar produces a flat sequence of text and
//! action tokens (with `{{-`/`-}}` trimming applied), then a small recursive builder
//! folds `if`/`range`/`with` blocks into a tree.

use crate::ast::{Command, Node, Operand, Pipeline};
use crate::error::{Result, TemplateError};
use apiary_schema::Value;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "template.pest"]
struct TemplateParser;

/// Parse template source into a node list
pub fn parse(name: &str, source: &str) -> Result<Vec<Node>> {
    let mut pairs = TemplateParser::parse(Rule::template, source)
        .map_err(|e| TemplateError::syntax(name, e.to_string()))?;

    let root = pairs
        .next()
        .ok_or_else(|| TemplateError::syntax(name, "empty parse tree"))?;

    let items = tokenize(name, root)?;
    let mut builder = TreeBuilder {
        name,
        items: items.into_iter(),
    };

    match builder.list()? {
        (nodes, None) => Ok(nodes),
        (_, Some(Terminator::End)) => Err(TemplateError::structure(name, "unexpected {{end}}")),
        (_, Some(_)) => Err(TemplateError::structure(name, "unexpected {{else}}")),
    }
}

enum Tag {
    Output(Pipeline),
    If(Pipeline),
    ElseIf(Pipeline),
    Else,
    End,
    Range(Pipeline),
    With(Pipeline),
    Comment,
}

enum Item {
    Text(String),
    Tag(Tag),
}

fn tokenize(name: &str, root: Pair<Rule>) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut trim_next = false;

    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::text => {
                let text = if trim_next {
                    pair.as_str().trim_start()
                } else {
                    pair.as_str()
                };
                trim_next = false;
                if !text.is_empty() {
                    items.push(Item::Text(text.to_string()));
                }
            }
            Rule::action | Rule::comment => {
                let (tag, trim_left, trim_right) = build_tag(name, pair)?;
                if trim_left {
                    if let Some(Item::Text(previous)) = items.last_mut() {
                        let len = previous.trim_end().len();
                        previous.truncate(len);
                    }
                }
                trim_next = trim_right;
                if !matches!(tag, Tag::Comment) {
                    items.push(Item::Tag(tag));
                }
            }
            Rule::EOI => {}
            rule => {
                return Err(TemplateError::syntax(
                    name,
                    format!("unexpected element {:?}", rule),
                ))
            }
        }
    }

    Ok(items)
}

fn build_tag(name: &str, pair: Pair<Rule>) -> Result<(Tag, bool, bool)> {
    let mut trim_left = false;
    let mut trim_right = false;
    let mut tag = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::trim_left => trim_left = true,
            Rule::trim_right => trim_right = true,
            Rule::comment_body => tag = Some(Tag::Comment),
            Rule::pipeline => tag = Some(Tag::Output(build_pipeline(name, inner)?)),
            Rule::if_tag => tag = Some(Tag::If(tag_pipeline(name, inner)?)),
            Rule::else_if_tag => tag = Some(Tag::ElseIf(tag_pipeline(name, inner)?)),
            Rule::range_tag => tag = Some(Tag::Range(tag_pipeline(name, inner)?)),
            Rule::with_tag => tag = Some(Tag::With(tag_pipeline(name, inner)?)),
            Rule::else_tag => tag = Some(Tag::Else),
            Rule::end_tag => tag = Some(Tag::End),
            _ => {}
        }
    }

    let tag = tag.ok_or_else(|| TemplateError::syntax(name, "empty action"))?;
    Ok((tag, trim_left, trim_right))
}

/// The pipeline following a block keyword
fn tag_pipeline(name: &str, pair: Pair<Rule>) -> Result<Pipeline> {
    let pipeline = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::pipeline)
        .ok_or_else(|| TemplateError::syntax(name, "missing pipeline"))?;
    build_pipeline(name, pipeline)
}

fn build_pipeline(name: &str, pair: Pair<Rule>) -> Result<Pipeline> {
    let mut pipeline = Pipeline::default();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::declaration => {
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::variable => pipeline.vars.push(part.as_str()[1..].to_string()),
                        Rule::assign_op => pipeline.declare = part.as_str() == ":=",
                        _ => {}
                    }
                }
            }
            Rule::command => {
                let args = inner
                    .into_inner()
                    .map(|operand| build_operand(name, operand))
                    .collect::<Result<Vec<_>>>()?;
                pipeline.commands.push(Command { args });
            }
            _ => {}
        }
    }

    if pipeline.commands.is_empty() {
        return Err(TemplateError::syntax(name, "missing command"));
    }
    Ok(pipeline)
}

fn build_operand(name: &str, pair: Pair<Rule>) -> Result<Operand> {
    let mut inner = pair.into_inner();
    let term = inner
        .next()
        .ok_or_else(|| TemplateError::syntax(name, "missing operand"))?;

    let operand = match term.as_rule() {
        Rule::paren => {
            let pipeline = term
                .into_inner()
                .next()
                .ok_or_else(|| TemplateError::syntax(name, "empty parenthesis"))?;
            Operand::Pipeline(Box::new(build_pipeline(name, pipeline)?))
        }
        Rule::string => {
            let raw = term.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Operand::Literal(Value::String(unescape(name, raw)?))
        }
        Rule::raw_string => {
            let raw = term.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Operand::Literal(Value::String(raw.to_string()))
        }
        Rule::number => Operand::Literal(parse_number(name, term.as_str())?),
        Rule::bool_lit => Operand::Literal(Value::Bool(term.as_str() == "true")),
        Rule::nil_lit => Operand::Literal(Value::Null),
        Rule::field => Operand::Field(split_fields(term.as_str())),
        Rule::dot => Operand::Dot,
        Rule::variable => Operand::Variable(term.as_str()[1..].to_string()),
        Rule::ident => Operand::Call(term.as_str().to_string()),
        rule => {
            return Err(TemplateError::syntax(
                name,
                format!("unexpected operand {:?}", rule),
            ))
        }
    };

    match inner.next() {
        Some(selector) => Ok(Operand::Chain(
            Box::new(operand),
            split_fields(selector.as_str()),
        )),
        None => Ok(operand),
    }
}

fn split_fields(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(name: &str, text: &str) -> Result<Value> {
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Value::Int(v));
        }
    }
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| TemplateError::syntax(name, format!("invalid number {}", text)))
}

fn unescape(name: &str, raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                return Err(TemplateError::syntax(
                    name,
                    format!("unknown escape sequence \\{}", other),
                ))
            }
            None => return Err(TemplateError::syntax(name, "unterminated escape")),
        }
    }

    Ok(out)
}

enum Terminator {
    Else,
    ElseIf(Pipeline),
    End,
}

struct TreeBuilder<'a> {
    name: &'a str,
    items: std::vec::IntoIter<Item>,
}

impl TreeBuilder<'_> {
    /// Collect nodes up to the next `else`/`end` or the end of input
    fn list(&mut self) -> Result<(Vec<Node>, Option<Terminator>)> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            match item {
                Item::Text(text) => nodes.push(Node::Text(text)),
                Item::Tag(Tag::Output(pipeline)) => nodes.push(Node::Output(pipeline)),
                Item::Tag(Tag::If(pipeline)) => nodes.push(self.if_block(pipeline)?),
                Item::Tag(Tag::Range(pipeline)) => {
                    let (body, otherwise) = self.block("range")?;
                    nodes.push(Node::Range {
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                Item::Tag(Tag::With(pipeline)) => {
                    let (body, otherwise) = self.block("with")?;
                    nodes.push(Node::With {
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                Item::Tag(Tag::Else) => return Ok((nodes, Some(Terminator::Else))),
                Item::Tag(Tag::ElseIf(pipeline)) => {
                    return Ok((nodes, Some(Terminator::ElseIf(pipeline))))
                }
                Item::Tag(Tag::End) => return Ok((nodes, Some(Terminator::End))),
                Item::Tag(Tag::Comment) => {}
            }
        }

        Ok((nodes, None))
    }

    fn if_block(&mut self, first: Pipeline) -> Result<Node> {
        let mut branches = Vec::new();
        let mut condition = first;

        loop {
            let (body, terminator) = self.list()?;
            branches.push((condition, body));
            match terminator {
                Some(Terminator::End) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    })
                }
                Some(Terminator::ElseIf(next)) => condition = next,
                Some(Terminator::Else) => {
                    let otherwise = self.closing_else("if")?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
                None => return Err(self.unclosed("if")),
            }
        }
    }

    fn block(&mut self, keyword: &str) -> Result<(Vec<Node>, Option<Vec<Node>>)> {
        let (body, terminator) = self.list()?;
        match terminator {
            Some(Terminator::End) => Ok((body, None)),
            Some(Terminator::Else) => Ok((body, Some(self.closing_else(keyword)?))),
            Some(Terminator::ElseIf(_)) => Err(TemplateError::structure(
                self.name,
                format!("{{{{else if}}}} is not allowed in {{{{{}}}}}", keyword),
            )),
            None => Err(self.unclosed(keyword)),
        }
    }

    fn closing_else(&mut self, keyword: &str) -> Result<Vec<Node>> {
        let (body, terminator) = self.list()?;
        match terminator {
            Some(Terminator::End) => Ok(body),
            None => Err(self.unclosed(keyword)),
            Some(_) => Err(TemplateError::structure(
                self.name,
                format!("expected {{{{end}}}} after {{{{else}}}} in {{{{{}}}}}", keyword),
            )),
        }
    }

    fn unclosed(&self, keyword: &str) -> TemplateError {
        TemplateError::structure(self.name, format!("unclosed {{{{{}}}}} block", keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_only() {
        let nodes = parse("t", "hello world").unwrap();
        assert_eq!(nodes, vec![Node::Text("hello world".into())]);
    }

    #[test]
    fn test_parse_field_output() {
        let nodes = parse("t", "Hi {{.user.name}}!").unwrap();
        assert_eq!(nodes.len(), 3);
        match &nodes[1] {
            Node::Output(pipeline) => {
                assert_eq!(
                    pipeline.commands[0].args,
                    vec![Operand::Field(vec!["user".into(), "name".into()])]
                );
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_call_with_literals() {
        let nodes = parse("t", r#"{{Left "abc" 2}}"#).unwrap();
        match &nodes[0] {
            Node::Output(pipeline) => assert_eq!(
                pipeline.commands[0].args,
                vec![
                    Operand::Call("Left".into()),
                    Operand::Literal(Value::from("abc")),
                    Operand::Literal(Value::Int(2)),
                ]
            ),
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_and_parens() {
        let nodes = parse("t", "{{(len .items) | print}}").unwrap();
        match &nodes[0] {
            Node::Output(pipeline) => {
                assert_eq!(pipeline.commands.len(), 2);
                assert!(matches!(pipeline.commands[0].args[0], Operand::Pipeline(_)));
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_else_chain() {
        let nodes = parse("t", "{{if .a}}A{{else if .b}}B{{else}}C{{end}}").unwrap();
        match &nodes[0] {
            Node::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise.as_ref().unwrap(), &vec![Node::Text("C".into())]);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_range_declaration() {
        let nodes = parse("t", "{{range $i, $e := .list}}{{$e}}{{end}}").unwrap();
        match &nodes[0] {
            Node::Range { pipeline, .. } => {
                assert_eq!(pipeline.vars, vec!["i".to_string(), "e".to_string()]);
                assert!(pipeline.declare);
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_trim_markers() {
        let nodes = parse("t", "a  {{- .x -}}  b").unwrap();
        assert_eq!(nodes[0], Node::Text("a".into()));
        assert_eq!(nodes[2], Node::Text("b".into()));
    }

    #[test]
    fn test_comments_are_dropped() {
        let nodes = parse("t", "a{{/* note */}}b").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Text("a".into()), Node::Text("b".into())]
        );
    }

    #[test]
    fn test_string_escapes() {
        let nodes = parse("t", r#"{{"a\"b\n"}}"#).unwrap();
        match &nodes[0] {
            Node::Output(pipeline) => assert_eq!(
                pipeline.commands[0].args[0],
                Operand::Literal(Value::from("a\"b\n"))
            ),
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_structure_errors() {
        assert!(matches!(
            parse("t", "{{if .a}}x"),
            Err(TemplateError::Structure { .. })
        ));
        assert!(matches!(
            parse("t", "x{{end}}"),
            Err(TemplateError::Structure { .. })
        ));
        assert!(matches!(
            parse("t", "{{range .a}}x{{else if .b}}y{{end}}"),
            Err(TemplateError::Structure { .. })
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            parse("t", "{{ .a "),
            Err(TemplateError::Syntax { .. })
        ));
    }
}
