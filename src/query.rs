use crate::error::{JobError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub const DEFAULT_IDENTIFIER_FIELD: &str = "Id";

const QUERY_PATTERN: &str = r"(?is)^\s*SELECT\s+(?P<fields>.+?)\s+FROM\s+(?P<source>[A-Za-z_][A-Za-z0-9_]*)(?:\s+WHERE\s+(?P<filter>.+?))?(?:\s+LIMIT\s+(?P<limit>\d+))?\s*;?\s*$";
const FIELD_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_.]*$";
const CONDITION_PATTERN: &str = r#"(?i)^\s*(?P<field>[A-Za-z_][A-Za-z0-9_.]*)\s*(?P<op>!=|<=|>=|=|<|>)\s*(?P<value>'(?:[^'\\]|\\.)*'|-?\d+(?:\.\d+)?|true\b|false\b|null\b)"#;
const AND_PATTERN: &str = r"(?i)^\s+AND\s+";

/// A syntactically validated selection descriptor:
/// `SELECT Id[, ...] FROM Source [WHERE a = 'x' [AND ...]] [LIMIT n]`.
///
/// Only syntax is checked here; whether the source and fields exist is the
/// chunk source's business at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionQuery {
    raw: String,
    identifier_field: String,
    fields: Vec<String>,
    source: String,
    conditions: Vec<Condition>,
    limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub value: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl SelectionQuery {
    pub fn parse(raw: &str, identifier_field: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(JobError::config("selection_query", "selection query is empty"));
        }
        if !compile(r"(?i)\bSELECT\b")?.is_match(trimmed) {
            return Err(JobError::config(
                "selection_query",
                format!("selection query has no SELECT clause: {trimmed}"),
            ));
        }
        if !compile(r"(?i)\bFROM\b")?.is_match(trimmed) {
            return Err(JobError::config(
                "selection_query",
                format!("selection query has no FROM clause: {trimmed}"),
            ));
        }

        let caps = compile(QUERY_PATTERN)?.captures(trimmed).ok_or_else(|| {
            JobError::config(
                "selection_query",
                format!("malformed selection query: {trimmed}"),
            )
        })?;

        let field_re = compile(FIELD_PATTERN)?;
        let mut fields = Vec::new();
        for f in caps["fields"].split(',').map(str::trim) {
            if !field_re.is_match(f) {
                return Err(JobError::config(
                    "selection_query",
                    format!("invalid field in SELECT list: '{f}'"),
                ));
            }
            fields.push(canonical_field(f, identifier_field));
        }
        if !fields.iter().any(|f| f == identifier_field) {
            return Err(JobError::config(
                "selection_query",
                format!("SELECT list must include the identifier field '{identifier_field}'"),
            ));
        }

        let conditions = match caps.name("filter") {
            Some(m) => parse_conditions(m.as_str(), identifier_field)?,
            None => Vec::new(),
        };

        let limit = match caps.name("limit") {
            Some(m) => Some(m.as_str().parse::<u64>().map_err(|e| {
                JobError::config("selection_query", format!("invalid LIMIT: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            raw: trimmed.to_string(),
            identifier_field: identifier_field.to_string(),
            fields,
            source: caps["source"].to_string(),
            conditions,
            limit,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn identifier_field(&self) -> &str {
        &self.identifier_field
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Every field named in the SELECT list or the WHERE clause.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain(self.conditions.iter().map(|c| c.field.as_str()))
    }

    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

impl Condition {
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match (&self.value, actual) {
            (Literal::Null, v) => match self.op {
                CompareOp::Eq => v.is_null(),
                CompareOp::Ne => !v.is_null(),
                _ => false,
            },
            (Literal::Str(want), Value::String(have)) => self.op.holds(have.as_str().cmp(want)),
            (Literal::Num(want), Value::Number(have)) => match have.as_f64() {
                Some(have) => have
                    .partial_cmp(want)
                    .map(|o| self.op.holds(o))
                    .unwrap_or(false),
                None => false,
            },
            (Literal::Bool(want), Value::Bool(have)) => match self.op {
                CompareOp::Eq => have == want,
                CompareOp::Ne => have != want,
                _ => false,
            },
            _ => self.op == CompareOp::Ne,
        }
    }
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }

    fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }
}

fn parse_conditions(filter: &str, identifier_field: &str) -> Result<Vec<Condition>> {
    let cond_re = compile(CONDITION_PATTERN)?;
    let and_re = compile(AND_PATTERN)?;

    let mut out = Vec::new();
    let mut rest = filter;
    loop {
        let caps = cond_re.captures(rest).ok_or_else(|| {
            JobError::config(
                "selection_query",
                format!("malformed WHERE condition near: '{}'", rest.trim()),
            )
        })?;
        let op = CompareOp::from_token(&caps["op"]).ok_or_else(|| {
            JobError::config("selection_query", format!("unknown operator '{}'", &caps["op"]))
        })?;
        out.push(Condition {
            field: canonical_field(&caps["field"], identifier_field),
            op,
            value: parse_literal(&caps["value"])?,
        });

        let consumed = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());
        rest = &rest[consumed..];
        if rest.trim().is_empty() {
            return Ok(out);
        }
        match and_re.find(rest) {
            Some(m) => rest = &rest[m.end()..],
            None => {
                return Err(JobError::config(
                    "selection_query",
                    format!("expected AND near: '{}'", rest.trim()),
                ));
            }
        }
    }
}

/// The identifier field is matched case-insensitively and stored as configured.
fn canonical_field(field: &str, identifier_field: &str) -> String {
    if field.eq_ignore_ascii_case(identifier_field) {
        identifier_field.to_string()
    } else {
        field.to_string()
    }
}

fn parse_literal(tok: &str) -> Result<Literal> {
    if let Some(inner) = tok.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        let mut s = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    s.push(next);
                }
            } else {
                s.push(ch);
            }
        }
        return Ok(Literal::Str(s));
    }
    match tok.to_ascii_lowercase().as_str() {
        "true" => return Ok(Literal::Bool(true)),
        "false" => return Ok(Literal::Bool(false)),
        "null" => return Ok(Literal::Null),
        _ => {}
    }
    tok.parse::<f64>()
        .map(Literal::Num)
        .map_err(|e| JobError::config("selection_query", format!("invalid literal '{tok}': {e}")))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| JobError::config("selection_query", e.to_string()))
}
