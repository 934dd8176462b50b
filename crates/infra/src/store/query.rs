//! Filter/update evaluation for the in-memory collection.
//!
//! Covers the operator subset the job queue issues plus the common
//! neighbours: equality (dotted paths, array membership), `$eq`, `$ne`,
//! `$in`, `$nin`, `$lt`, `$lte`, `$gt`, `$gte`, `$exists`, `$and`, `$or`;
//! updates `$set`, `$unset`, `$setOnInsert`, `$push` (with `$each`).
//! RFC 3339 strings compare as instants so timestamp filters behave.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use super::collection::Document;
use super::error::StoreError;

pub(super) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), StoreError> {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            match child {
                Value::Object(map) => set_path(map, rest, value),
                _ => Err(StoreError::backend(format!(
                    "cannot create field '{rest}' inside non-object '{head}'"
                ))),
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(map)) = doc.get_mut(head) {
                remove_path(map, rest);
            }
        }
    }
}

fn is_operator_doc(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// Ordering for values of the same kind; `None` when they are not comparable.
fn compare_same_kind(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting; missing sorts with null, lowest.
pub(super) fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (kind_rank(a), kind_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_same_kind(x, y)
            .unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
        _ => Ordering::Equal,
    }
}

fn values_equal(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual) => {
            if actual == expected {
                return true;
            }
            match (actual, expected) {
                (Value::Array(items), _) if !expected.is_array() => items.contains(expected),
                (Value::String(_), Value::String(_)) => {
                    compare_same_kind(actual, expected) == Some(Ordering::Equal)
                }
                (Value::Number(_), Value::Number(_)) => {
                    compare_same_kind(actual, expected) == Some(Ordering::Equal)
                }
                _ => false,
            }
        }
    }
}

fn compare_op(field: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    let candidates: Vec<&Value> = match field {
        None => return false,
        Some(Value::Array(items)) if !bound.is_array() => items.iter().collect(),
        Some(v) => vec![v],
    };
    candidates
        .into_iter()
        .any(|v| compare_same_kind(v, bound).is_some_and(accept))
}

fn eval_operators(field: Option<&Value>, ops: &Document) -> Result<bool, StoreError> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => values_equal(field, arg),
            "$ne" => !values_equal(field, arg),
            "$in" | "$nin" => {
                let list = arg
                    .as_array()
                    .ok_or_else(|| StoreError::backend(format!("{op} needs an array")))?;
                let hit = list.iter().any(|v| values_equal(field, v));
                if op == "$in" { hit } else { !hit }
            }
            "$lt" => compare_op(field, arg, Ordering::is_lt),
            "$lte" => compare_op(field, arg, Ordering::is_le),
            "$gt" => compare_op(field, arg, Ordering::is_gt),
            "$gte" => compare_op(field, arg, Ordering::is_ge),
            "$exists" => {
                let wanted = arg.as_bool().unwrap_or(true);
                field.is_some() == wanted
            }
            other => {
                return Err(StoreError::backend(format!(
                    "unsupported filter operator: {other}"
                )));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(op: &str, arg: &Value) -> Result<Vec<Document>, StoreError> {
    let list = arg
        .as_array()
        .ok_or_else(|| StoreError::backend(format!("{op} needs an array")))?;
    list.iter()
        .map(|v| match v {
            Value::Object(map) => Ok(map.clone()),
            _ => Err(StoreError::backend(format!("{op} entries must be documents"))),
        })
        .collect()
}

/// Whether `doc` satisfies `filter`.
pub(super) fn matches(doc: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, cond)? {
                    if !matches(doc, &sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, cond)? {
                    if matches(doc, &sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            k if k.starts_with('$') => {
                return Err(StoreError::backend(format!(
                    "unsupported top-level operator: {k}"
                )));
            }
            path => {
                let field = get_path(doc, path);
                match cond {
                    Value::Object(ops) if is_operator_doc(cond) => eval_operators(field, ops)?,
                    expected => values_equal(field, expected),
                }
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Starting document for an upsert: the filter's plain equality fields.
pub(super) fn seed_from_filter(filter: &Document) -> Result<Document, StoreError> {
    let mut seed = Document::new();
    for (key, cond) in filter {
        if key.starts_with('$') || is_operator_doc(cond) {
            continue;
        }
        set_path(&mut seed, key, cond.clone())?;
    }
    Ok(seed)
}

fn operator_fields<'a>(op: &str, arg: &'a Value) -> Result<&'a Document, StoreError> {
    arg.as_object()
        .ok_or_else(|| StoreError::backend(format!("{op} needs a document")))
}

/// Apply an operator-style update in place.
///
/// `inserting` enables `$setOnInsert`.
pub(super) fn apply_update(
    doc: &mut Document,
    update: &Document,
    inserting: bool,
) -> Result<(), StoreError> {
    if update.is_empty() {
        return Err(StoreError::backend("update document is empty"));
    }
    for (op, arg) in update {
        match op.as_str() {
            "$set" => {
                for (path, value) in operator_fields(op, arg)? {
                    set_path(doc, path, value.clone())?;
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (path, value) in operator_fields(op, arg)? {
                        set_path(doc, path, value.clone())?;
                    }
                }
            }
            "$unset" => {
                for path in operator_fields(op, arg)?.keys() {
                    remove_path(doc, path);
                }
            }
            "$push" => {
                for (path, value) in operator_fields(op, arg)? {
                    let additions = match value {
                        Value::Object(m) if m.len() == 1 && m.contains_key("$each") => m["$each"]
                            .as_array()
                            .cloned()
                            .ok_or_else(|| StoreError::backend("$each needs an array"))?,
                        other => vec![other.clone()],
                    };
                    match get_path(doc, path) {
                        None | Some(Value::Null) => {
                            set_path(doc, path, Value::Array(additions))?;
                        }
                        Some(Value::Array(existing)) => {
                            let mut items = existing.clone();
                            items.extend(additions);
                            set_path(doc, path, Value::Array(items))?;
                        }
                        Some(_) => {
                            return Err(StoreError::backend(format!(
                                "$push target '{path}' is not an array"
                            )));
                        }
                    }
                }
            }
            other if other.starts_with('$') => {
                return Err(StoreError::backend(format!(
                    "unsupported update operator: {other}"
                )));
            }
            other => {
                return Err(StoreError::backend(format!(
                    "replacement-style updates are not supported (field '{other}')"
                )));
            }
        }
    }
    Ok(())
}
