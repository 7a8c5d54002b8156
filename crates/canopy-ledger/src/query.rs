//! JSON selector queries over stored documents
//!
//! A query document looks like
//!
//! ```json
//! {
//!   "selector": { "docType": "claim", "status": { "$in": ["Pending", "Approved"] } },
//!   "sort": [{ "triggerDate": "desc" }],
//!   "limit": 50
//! }
//! ```
//!
//! A bare selector object (without the `selector` wrapper) is accepted too.
//! Supported operators: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//! `$exists`, plus `$and` / `$or` arrays. Field names may be dotted paths.
//! Strings that are both RFC 3339 timestamps compare chronologically.

use std::cmp::Ordering;

use canopy_common::{CanopyError, Result};
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

/// Comparison operator on one field
#[derive(Debug, Clone, PartialEq)]
enum Op {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Field { path: Vec<String>, ops: Vec<Op> },
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

/// Parsed selector: every clause must match
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Selector with optional ordering and limit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub selector: Selector,
    pub sort: Vec<(Vec<String>, SortOrder)>,
    pub limit: Option<usize>,
}

impl Selector {
    /// Parse a selector object
    pub fn parse(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CanopyError::invalid("selector must be a JSON object"))?;

        let mut clauses = Vec::with_capacity(obj.len());
        for (key, cond) in obj {
            let clause = match key.as_str() {
                "$and" => Clause::And(parse_selector_list(key, cond)?),
                "$or" => Clause::Or(parse_selector_list(key, cond)?),
                k if k.starts_with('$') => {
                    return Err(CanopyError::invalid(format!("unsupported selector operator {}", k)))
                }
                field => Clause::Field {
                    path: split_path(field),
                    ops: parse_ops(cond)?,
                },
            };
            clauses.push(clause);
        }
        Ok(Self { clauses })
    }

    /// Whether a document satisfies every clause
    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { path, ops } => {
                let field = lookup(doc, path);
                ops.iter().all(|op| eval(op, field))
            }
            Clause::And(all) => all.iter().all(|s| s.matches(doc)),
            Clause::Or(any) => any.iter().any(|s| s.matches(doc)),
        })
    }
}

impl Query {
    /// Parse a query document (`{selector, sort, limit}` or a bare selector)
    pub fn parse(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CanopyError::invalid("query must be a JSON object"))?;

        let Some(selector) = obj.get("selector") else {
            return Ok(Self {
                selector: Selector::parse(value)?,
                ..Default::default()
            });
        };

        let mut query = Self {
            selector: Selector::parse(selector)?,
            ..Default::default()
        };

        if let Some(sort) = obj.get("sort") {
            query.sort = parse_sort(sort)?;
        }
        if let Some(limit) = obj.get("limit") {
            let n = limit
                .as_u64()
                .ok_or_else(|| CanopyError::invalid("limit must be a non-negative integer"))?;
            query.limit = Some(n as usize);
        }
        Ok(query)
    }

    /// Filter, sort and truncate `(key, document)` pairs
    pub fn run<I>(&self, docs: I) -> Vec<(String, Value)>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let hits = docs
            .into_iter()
            .filter(|(_, doc)| self.selector.matches(doc))
            .collect();
        self.finish(hits)
    }

    /// Sort and truncate documents that already matched the selector
    pub fn finish(&self, mut hits: Vec<(String, Value)>) -> Vec<(String, Value)> {
        if !self.sort.is_empty() {
            hits.sort_by(|(ka, a), (kb, b)| {
                for (path, order) in &self.sort {
                    let ord = sort_cmp(lookup(a, path), lookup(b, path));
                    let ord = match order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                ka.cmp(kb)
            });
        }

        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits
    }
}

fn parse_selector_list(op: &str, value: &Value) -> Result<Vec<Selector>> {
    let items = value
        .as_array()
        .ok_or_else(|| CanopyError::invalid(format!("{} expects an array", op)))?;
    items.iter().map(Selector::parse).collect()
}

fn parse_ops(cond: &Value) -> Result<Vec<Op>> {
    let ops = match cond {
        Value::Object(map) if is_operator_map(map) => map,
        other => return Ok(vec![Op::Eq(other.clone())]),
    };

    ops.iter()
        .map(|(name, arg)| {
            let op = match name.as_str() {
                "$eq" => Op::Eq(arg.clone()),
                "$ne" => Op::Ne(arg.clone()),
                "$gt" => Op::Gt(arg.clone()),
                "$gte" => Op::Gte(arg.clone()),
                "$lt" => Op::Lt(arg.clone()),
                "$lte" => Op::Lte(arg.clone()),
                "$in" => Op::In(
                    arg.as_array()
                        .cloned()
                        .ok_or_else(|| CanopyError::invalid("$in expects an array"))?,
                ),
                "$exists" => Op::Exists(
                    arg.as_bool()
                        .ok_or_else(|| CanopyError::invalid("$exists expects a boolean"))?,
                ),
                other => {
                    return Err(CanopyError::invalid(format!(
                        "unsupported selector operator {}",
                        other
                    )))
                }
            };
            Ok(op)
        })
        .collect()
}

fn is_operator_map(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_sort(sort: &Value) -> Result<Vec<(Vec<String>, SortOrder)>> {
    let entries = sort
        .as_array()
        .ok_or_else(|| CanopyError::invalid("sort must be an array"))?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::String(field) => out.push((split_path(field), SortOrder::Asc)),
            Value::Object(map) => {
                for (field, dir) in map {
                    let order = match dir.as_str() {
                        Some("asc") => SortOrder::Asc,
                        Some("desc") => SortOrder::Desc,
                        _ => {
                            return Err(CanopyError::invalid(format!(
                                "sort direction for {} must be \"asc\" or \"desc\"",
                                field
                            )))
                        }
                    };
                    out.push((split_path(field), order));
                }
            }
            _ => return Err(CanopyError::invalid("sort entries must be strings or objects")),
        }
    }
    Ok(out)
}

fn split_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn lookup<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |cur, seg| cur.get(seg.as_str()))
}

fn eval(op: &Op, field: Option<&Value>) -> bool {
    let cmp = |v: &Value| field.and_then(|f| compare(f, v));
    match op {
        Op::Exists(want) => field.is_some() == *want,
        Op::Ne(v) => field.map_or(true, |f| !values_equal(f, v)),
        Op::Eq(v) => field.is_some_and(|f| values_equal(f, v)),
        Op::In(vs) => field.is_some_and(|f| vs.iter().any(|v| values_equal(f, v))),
        Op::Gt(v) => cmp(v) == Some(Ordering::Greater),
        Op::Gte(v) => matches!(cmp(v), Some(Ordering::Greater | Ordering::Equal)),
        Op::Lt(v) => cmp(v) == Some(Ordering::Less),
        Op::Lte(v) => matches!(cmp(v), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            compare(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// Ordering between two scalar JSON values of the same kind
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (as_timestamp(x), as_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    // cheap pre-check before attempting a parse
    if s.len() < 20 || s.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok()
}

/// Total order used for sorting: missing < null < bool < number < string
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}
