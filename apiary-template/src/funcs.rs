//! Function map available to templates
//!
//! Contains the control builtins (`eq`, `len`, `index`, `printf`, ...) and the
//! string helpers (`Left`, `Split`, `TrimSpace`, ...) used in chain configurations.

use crate::error::{Result, TemplateError};
use ahash::AHashMap;
use apiary_schema::Value;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// A template function
pub type TemplateFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

static BUILTIN: LazyLock<FuncMap> = LazyLock::new(|| {
    let mut funcs = FuncMap::new();
    register_builtins(&mut funcs);
    register_helpers(&mut funcs);
    funcs
});

/// Named functions callable from templates
#[derive(Clone, Default)]
pub struct FuncMap {
    funcs: AHashMap<String, TemplateFn>,
}

impl FuncMap {
    /// Create an empty function map
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared map with all builtin and helper functions
    pub fn builtin() -> &'static FuncMap {
        &BUILTIN
    }

    /// Owned copy of the builtin map, for extension
    pub fn with_builtins() -> Self {
        BUILTIN.clone()
    }

    /// Register a function, replacing any previous one of the same name
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.funcs.insert(name.into(), Arc::new(func));
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFn> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Sorted function names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FuncMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncMap")
            .field("funcs", &self.names())
            .finish()
    }
}

/// Walk a field path; missing keys and null yield null
pub(crate) fn resolve(value: &Value, path: &[String]) -> Result<Value> {
    let mut current = value;
    for field in path {
        match current {
            Value::Map(map) => match map.get(field) {
                Some(next) => current = next,
                None => return Ok(Value::Null),
            },
            Value::Null => return Ok(Value::Null),
            other => {
                return Err(TemplateError::exec(format!(
                    "can't evaluate field {} in type {}",
                    field,
                    other.type_name()
                )))
            }
        }
    }
    Ok(current.clone())
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arity(func: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(TemplateError::arg_count(func, expected.to_string(), args.len()));
    }
    Ok(())
}

fn arity_between(func: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(TemplateError::arg_count(
            func,
            format!("{} to {}", min, max),
            args.len(),
        ));
    }
    Ok(())
}

fn at_least(func: &str, args: &[Value], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(TemplateError::arg_count(
            func,
            format!("at least {}", min),
            args.len(),
        ));
    }
    Ok(())
}

fn str_arg<'v>(func: &str, args: &'v [Value], index: usize) -> Result<&'v str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(TemplateError::type_mismatch(func, "string", other.type_name())),
        None => Err(TemplateError::arg_count(func, (index + 1).to_string(), args.len())),
    }
}

fn int_arg(func: &str, args: &[Value], index: usize) -> Result<i64> {
    match args.get(index) {
        Some(Value::Int(v)) => Ok(*v),
        Some(Value::Float(v)) if v.fract() == 0.0 => Ok(*v as i64),
        Some(other) => Err(TemplateError::type_mismatch(func, "int", other.type_name())),
        None => Err(TemplateError::arg_count(func, (index + 1).to_string(), args.len())),
    }
}

fn list_arg<'v>(func: &str, args: &'v [Value], index: usize) -> Result<&'v [Value]> {
    match args.get(index) {
        Some(Value::List(items)) => Ok(items),
        Some(other) => Err(TemplateError::type_mismatch(func, "list", other.type_name())),
        None => Err(TemplateError::arg_count(func, (index + 1).to_string(), args.len())),
    }
}

fn clamp_index(index: i64, len: usize) -> usize {
    index.clamp(0, len as i64) as usize
}

fn string_list(items: Vec<&str>) -> Value {
    Value::List(items.into_iter().map(Value::from).collect())
}

// ============================================================================
// Builtins
// ============================================================================

fn register_builtins(funcs: &mut FuncMap) {
    funcs.register("not", |args| {
        arity("not", args, 1)?;
        Ok(Value::Bool(!args[0].is_truthy()))
    });

    funcs.register("len", |args| {
        arity("len", args, 1)?;
        args[0]
            .len()
            .map(|n| Value::Int(n as i64))
            .ok_or_else(|| TemplateError::type_mismatch("len", "string, list or map", args[0].type_name()))
    });

    funcs.register("index", |args| {
        at_least("index", args, 1)?;
        let mut current = args[0].clone();
        for key in &args[1..] {
            current = match (&current, key) {
                (Value::List(items), Value::Int(i)) => items
                    .get(usize::try_from(*i).unwrap_or(usize::MAX))
                    .cloned()
                    .ok_or_else(|| TemplateError::exec(format!("index out of range: {}", i)))?,
                (Value::Map(map), Value::String(k)) => map.get(k).cloned().unwrap_or_default(),
                (Value::Null, _) => Value::Null,
                (container, key) => {
                    return Err(TemplateError::exec(format!(
                        "can't index item of type {} with {}",
                        container.type_name(),
                        key.type_name()
                    )))
                }
            };
        }
        Ok(current)
    });

    funcs.register("eq", |args| {
        at_least("eq", args, 2)?;
        for other in &args[1..] {
            if values_equal("eq", &args[0], other)? {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });

    funcs.register("ne", |args| {
        arity("ne", args, 2)?;
        Ok(Value::Bool(!values_equal("ne", &args[0], &args[1])?))
    });

    funcs.register("lt", |args| ordered("lt", args, |o| o == Ordering::Less));
    funcs.register("le", |args| ordered("le", args, |o| o != Ordering::Greater));
    funcs.register("gt", |args| ordered("gt", args, |o| o == Ordering::Greater));
    funcs.register("ge", |args| ordered("ge", args, |o| o != Ordering::Less));

    funcs.register("print", |args| Ok(Value::String(sprint(args))));

    funcs.register("println", |args| {
        let mut out = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        out.push('\n');
        Ok(Value::String(out))
    });

    funcs.register("printf", |args| {
        at_least("printf", args, 1)?;
        let format = str_arg("printf", args, 0)?;
        Ok(Value::String(sprintf(format, &args[1..])))
    });
}

fn values_equal(func: &str, a: &Value, b: &Value) -> Result<bool> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(a.is_null() && b.is_null()),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(a.as_f64() == b.as_f64())
        }
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => Err(
            TemplateError::type_mismatch(func, "comparable value", "list or map"),
        ),
        _ => Err(TemplateError::type_mismatch(
            func,
            a.type_name(),
            b.type_name(),
        )),
    }
}

fn compare(func: &str, a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| TemplateError::exec(format!("{}: NaN is not comparable", func))),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(TemplateError::type_mismatch(
            func,
            format!("ordered values of one kind, got {}", a.type_name()),
            b.type_name(),
        )),
    }
}

fn ordered(func: &str, args: &[Value], accept: fn(Ordering) -> bool) -> Result<Value> {
    arity(func, args, 2)?;
    Ok(Value::Bool(accept(compare(func, &args[0], &args[1])?)))
}

/// Operands are joined with a space unless one side is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::String(_)) && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

/// Minimal printf supporting %v %s %d %f %q %t %x and %%, with `.N` precision
fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision = None;
        if chars.next_if_eq(&'.').is_some() {
            let mut digits = String::new();
            while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                digits.push(d);
            }
            precision = digits.parse::<usize>().ok();
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = next.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };

        let formatted = match (verb, arg) {
            ('v' | 's', value) => value.to_string(),
            ('d', Value::Int(v)) => v.to_string(),
            ('d', Value::Float(v)) if v.fract() == 0.0 => (*v as i64).to_string(),
            ('f' | 'F', value) if value.as_f64().is_some() => {
                format!("{:.*}", precision.unwrap_or(6), value.as_f64().unwrap_or_default())
            }
            ('q', value) => format!("{:?}", value.to_string()),
            ('t', Value::Bool(b)) => b.to_string(),
            ('x', Value::Int(v)) => format!("{:x}", v),
            ('x', Value::String(s)) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
            (verb, value) => format!("%!{}({}={})", verb, value.type_name(), value),
        };
        out.push_str(&formatted);
    }

    out
}

// ============================================================================
// String helpers
// ============================================================================

fn register_helpers(funcs: &mut FuncMap) {
    let json = |args: &[Value]| {
        serde_json::to_string(&Value::List(args.to_vec()).to_json())
            .map(Value::String)
            .map_err(|e| TemplateError::exec(e.to_string()))
    };
    funcs.register("JSON", json);
    funcs.register("Json", json);

    funcs.register("Left", |args| {
        arity("Left", args, 2)?;
        let s = str_arg("Left", args, 0)?;
        let n = clamp_index(int_arg("Left", args, 1)?, s.chars().count());
        Ok(Value::String(s.chars().take(n).collect()))
    });

    funcs.register("Right", |args| {
        arity("Right", args, 2)?;
        let s = str_arg("Right", args, 0)?;
        let len = s.chars().count();
        let n = clamp_index(int_arg("Right", args, 1)?, len);
        Ok(Value::String(s.chars().skip(len - n).collect()))
    });

    funcs.register("Mid", |args| {
        arity_between("Mid", args, 2, 3)?;
        let s = str_arg("Mid", args, 0)?;
        let len = s.chars().count();
        let start = clamp_index(int_arg("Mid", args, 1)?, len);
        let end = if args.len() > 2 {
            clamp_index(int_arg("Mid", args, 2)?, len).max(start)
        } else {
            len
        };
        Ok(Value::String(s.chars().skip(start).take(end - start).collect()))
    });

    funcs.register("Last", |args| {
        arity("Last", args, 1)?;
        Ok(list_arg("Last", args, 0)?.last().cloned().unwrap_or_default())
    });

    funcs.register("Matches", |args| {
        arity("Matches", args, 2)?;
        let s = str_arg("Matches", args, 0)?;
        let pattern = str_arg("Matches", args, 1)?;
        let regex = Regex::new(pattern)
            .map_err(|e| TemplateError::exec(format!("Matches: invalid pattern: {}", e)))?;
        Ok(Value::Bool(regex.is_match(s)))
    });

    funcs.register("Contains", |args| {
        arity("Contains", args, 2)?;
        Ok(Value::Bool(
            str_arg("Contains", args, 0)?.contains(str_arg("Contains", args, 1)?),
        ))
    });

    // One argument: any of its characters; several: any of the substrings
    funcs.register("ContainsAny", |args| {
        at_least("ContainsAny", args, 2)?;
        let s = str_arg("ContainsAny", args, 0)?;
        if args.len() == 2 {
            let chars = str_arg("ContainsAny", args, 1)?;
            return Ok(Value::Bool(s.contains(|c: char| chars.contains(c))));
        }
        for i in 1..args.len() {
            if s.contains(str_arg("ContainsAny", args, i)?) {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });

    funcs.register("ContainsAll", |args| {
        at_least("ContainsAll", args, 2)?;
        let s = str_arg("ContainsAll", args, 0)?;
        for i in 1..args.len() {
            if !s.contains(str_arg("ContainsAll", args, i)?) {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });

    funcs.register("Compare", |args| {
        arity("Compare", args, 2)?;
        let ordering = str_arg("Compare", args, 0)?.cmp(str_arg("Compare", args, 1)?);
        Ok(Value::Int(ordering as i64))
    });

    funcs.register("Count", |args| {
        arity("Count", args, 2)?;
        let s = str_arg("Count", args, 0)?;
        let sub = str_arg("Count", args, 1)?;
        let count = if sub.is_empty() {
            s.chars().count() + 1
        } else {
            s.matches(sub).count()
        };
        Ok(Value::Int(count as i64))
    });

    funcs.register("EqualFold", |args| {
        arity("EqualFold", args, 2)?;
        let a = str_arg("EqualFold", args, 0)?;
        let b = str_arg("EqualFold", args, 1)?;
        Ok(Value::Bool(a.to_lowercase() == b.to_lowercase()))
    });

    funcs.register("HasPrefix", |args| {
        arity("HasPrefix", args, 2)?;
        Ok(Value::Bool(
            str_arg("HasPrefix", args, 0)?.starts_with(str_arg("HasPrefix", args, 1)?),
        ))
    });

    funcs.register("HasSuffix", |args| {
        arity("HasSuffix", args, 2)?;
        Ok(Value::Bool(
            str_arg("HasSuffix", args, 0)?.ends_with(str_arg("HasSuffix", args, 1)?),
        ))
    });

    funcs.register("Index", |args| {
        arity("Index", args, 2)?;
        let pos = str_arg("Index", args, 0)?.find(str_arg("Index", args, 1)?);
        Ok(byte_position(pos))
    });

    funcs.register("IndexAny", |args| {
        arity("IndexAny", args, 2)?;
        let chars = str_arg("IndexAny", args, 1)?;
        let pos = str_arg("IndexAny", args, 0)?.find(|c: char| chars.contains(c));
        Ok(byte_position(pos))
    });

    funcs.register("LastIndex", |args| {
        arity("LastIndex", args, 2)?;
        let pos = str_arg("LastIndex", args, 0)?.rfind(str_arg("LastIndex", args, 1)?);
        Ok(byte_position(pos))
    });

    funcs.register("LastIndexAny", |args| {
        arity("LastIndexAny", args, 2)?;
        let chars = str_arg("LastIndexAny", args, 1)?;
        let pos = str_arg("LastIndexAny", args, 0)?.rfind(|c: char| chars.contains(c));
        Ok(byte_position(pos))
    });

    funcs.register("Join", |args| {
        arity("Join", args, 2)?;
        let items = list_arg("Join", args, 0)?;
        let sep = str_arg("Join", args, 1)?;
        Ok(Value::String(
            items
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(sep),
        ))
    });

    funcs.register("Repeat", |args| {
        arity("Repeat", args, 2)?;
        let s = str_arg("Repeat", args, 0)?;
        let count = usize::try_from(int_arg("Repeat", args, 1)?)
            .map_err(|_| TemplateError::exec("Repeat: negative count"))?;
        Ok(Value::String(s.repeat(count)))
    });

    funcs.register("Replace", |args| {
        arity("Replace", args, 4)?;
        let s = str_arg("Replace", args, 0)?;
        let old = str_arg("Replace", args, 1)?;
        let new = str_arg("Replace", args, 2)?;
        let replaced = match usize::try_from(int_arg("Replace", args, 3)?) {
            Ok(n) => s.replacen(old, new, n),
            Err(_) => s.replace(old, new),
        };
        Ok(Value::String(replaced))
    });

    funcs.register("Split", |args| {
        arity("Split", args, 2)?;
        let parts = split(str_arg("Split", args, 0)?, str_arg("Split", args, 1)?, false, -1);
        Ok(string_list(parts))
    });

    funcs.register("SplitAfter", |args| {
        arity("SplitAfter", args, 2)?;
        let parts = split(
            str_arg("SplitAfter", args, 0)?,
            str_arg("SplitAfter", args, 1)?,
            true,
            -1,
        );
        Ok(string_list(parts))
    });

    funcs.register("SplitN", |args| {
        arity("SplitN", args, 3)?;
        let parts = split(
            str_arg("SplitN", args, 0)?,
            str_arg("SplitN", args, 1)?,
            false,
            int_arg("SplitN", args, 2)?,
        );
        Ok(string_list(parts))
    });

    funcs.register("SplitAfterN", |args| {
        arity("SplitAfterN", args, 3)?;
        let parts = split(
            str_arg("SplitAfterN", args, 0)?,
            str_arg("SplitAfterN", args, 1)?,
            true,
            int_arg("SplitAfterN", args, 2)?,
        );
        Ok(string_list(parts))
    });

    funcs.register("Title", |args| {
        arity("Title", args, 1)?;
        Ok(Value::String(title(str_arg("Title", args, 0)?)))
    });

    funcs.register("ToTitle", |args| {
        arity("ToTitle", args, 1)?;
        let s = str_arg("ToTitle", args, 0)?;
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            push_title(&mut out, c);
        }
        Ok(Value::String(out))
    });

    funcs.register("ToLower", |args| {
        arity("ToLower", args, 1)?;
        Ok(Value::String(str_arg("ToLower", args, 0)?.to_lowercase()))
    });

    funcs.register("ToUpper", |args| {
        arity("ToUpper", args, 1)?;
        Ok(Value::String(str_arg("ToUpper", args, 0)?.to_uppercase()))
    });

    funcs.register("Trim", |args| {
        arity("Trim", args, 2)?;
        let cutset = str_arg("Trim", args, 1)?;
        Ok(Value::from(
            str_arg("Trim", args, 0)?.trim_matches(|c: char| cutset.contains(c)),
        ))
    });

    funcs.register("TrimLeft", |args| {
        arity("TrimLeft", args, 2)?;
        let cutset = str_arg("TrimLeft", args, 1)?;
        Ok(Value::from(
            str_arg("TrimLeft", args, 0)?.trim_start_matches(|c: char| cutset.contains(c)),
        ))
    });

    funcs.register("TrimRight", |args| {
        arity("TrimRight", args, 2)?;
        let cutset = str_arg("TrimRight", args, 1)?;
        Ok(Value::from(
            str_arg("TrimRight", args, 0)?.trim_end_matches(|c: char| cutset.contains(c)),
        ))
    });

    funcs.register("TrimSpace", |args| {
        arity("TrimSpace", args, 1)?;
        Ok(Value::from(str_arg("TrimSpace", args, 0)?.trim()))
    });

    funcs.register("TrimPrefix", |args| {
        arity("TrimPrefix", args, 2)?;
        let s = str_arg("TrimPrefix", args, 0)?;
        let prefix = str_arg("TrimPrefix", args, 1)?;
        Ok(Value::from(s.strip_prefix(prefix).unwrap_or(s)))
    });

    funcs.register("TrimSuffix", |args| {
        arity("TrimSuffix", args, 2)?;
        let s = str_arg("TrimSuffix", args, 0)?;
        let suffix = str_arg("TrimSuffix", args, 1)?;
        Ok(Value::from(s.strip_suffix(suffix).unwrap_or(s)))
    });
}

fn byte_position(pos: Option<usize>) -> Value {
    Value::Int(pos.map(|p| p as i64).unwrap_or(-1))
}

/// Split around `sep`; `n < 0` means no limit, `n == 0` yields nothing
fn split<'s>(s: &'s str, sep: &str, keep_sep: bool, n: i64) -> Vec<&'s str> {
    let mut parts = Vec::new();
    if n == 0 {
        return parts;
    }
    let limit_reached = |count: usize| n > 0 && count as i64 == n - 1;
    let mut rest = s;

    if sep.is_empty() {
        while !rest.is_empty() {
            if limit_reached(parts.len()) {
                parts.push(rest);
                return parts;
            }
            let len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            parts.push(&rest[..len]);
            rest = &rest[len..];
        }
        return parts;
    }

    while !limit_reached(parts.len()) {
        let Some(pos) = rest.find(sep) else { break };
        let end = if keep_sep { pos + sep.len() } else { pos };
        parts.push(&rest[..end]);
        rest = &rest[pos + sep.len()..];
    }
    parts.push(rest);
    parts
}

/// Upper-case the first letter of every word
fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            push_title(&mut out, c);
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

/// Title case differs from upper case only for the Latin digraph letters
fn push_title(out: &mut String, c: char) {
    match c {
        'Ǆ' | 'ǅ' | 'ǆ' => out.push('ǅ'),
        'Ǉ' | 'ǈ' | 'ǉ' => out.push('ǈ'),
        'Ǌ' | 'ǋ' | 'ǌ' => out.push('ǋ'),
        'Ǳ' | 'ǲ' | 'ǳ' => out.push('ǲ'),
        c => out.extend(c.to_uppercase()),
    }
}
