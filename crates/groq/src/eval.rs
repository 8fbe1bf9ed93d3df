// In-memory evaluation of filters and feed queries.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::ast::{Direction, Expr, Query};
use crate::functions::call_builtin;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("missing parameter ${0}")]
    MissingParam(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{function}() expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
}

/// A document a filter can be evaluated against. `_id` always resolves to
/// [`Document::document_id`].
pub trait Document {
    fn document_id(&self) -> &str;
    fn field(&self, path: &[String]) -> Option<&Value>;
}

impl Document for Value {
    fn document_id(&self) -> &str {
        self.get("_id").and_then(Value::as_str).unwrap_or_default()
    }

    fn field(&self, path: &[String]) -> Option<&Value> {
        path.iter().try_fold(self, |value, key| value.get(key))
    }
}

pub type Params = Map<String, Value>;

/// Evaluate a filter to a boolean. Non-boolean results do not match.
pub fn eval_filter<D: Document + ?Sized>(
    expr: &Expr,
    doc: &D,
    params: &Params,
) -> Result<bool, EvalError> {
    Ok(matches!(eval_expr(expr, doc, params)?, Value::Bool(true)))
}

pub fn eval_expr<D: Document + ?Sized>(
    expr: &Expr,
    doc: &D,
    params: &Params,
) -> Result<Value, EvalError> {
    match expr {
        Expr::StringLiteral(s) => Ok(Value::String(s.clone())),
        Expr::IntLiteral(n) => Ok(Value::from(*n)),
        Expr::FloatLiteral(n) => Ok(Value::from(*n)),
        Expr::BoolLiteral(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Array(items) => items
            .iter()
            .map(|item| eval_expr(item, doc, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident(_) | Expr::DotAccess(..) => Ok(resolve_path(expr, doc)),
        Expr::Param(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::MissingParam(name.clone())),
        Expr::Eq(l, r) => {
            let (lv, rv) = (eval_expr(l, doc, params)?, eval_expr(r, doc, params)?);
            Ok(Value::Bool(values_equal(&lv, &rv)))
        }
        Expr::Neq(l, r) => {
            let (lv, rv) = (eval_expr(l, doc, params)?, eval_expr(r, doc, params)?);
            Ok(Value::Bool(!values_equal(&lv, &rv)))
        }
        Expr::In(needle, haystack) => {
            let needle = eval_expr(needle, doc, params)?;
            let found = match eval_expr(haystack, doc, params)? {
                Value::Array(items) => items.iter().any(|item| values_equal(item, &needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        Expr::And(l, r) => Ok(Value::Bool(
            eval_filter(l, doc, params)? && eval_filter(r, doc, params)?,
        )),
        Expr::Or(l, r) => Ok(Value::Bool(
            eval_filter(l, doc, params)? || eval_filter(r, doc, params)?,
        )),
        Expr::Not(inner) => match eval_expr(inner, doc, params)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Ok(Value::Null),
        },
        Expr::FuncCall(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval_expr(arg, doc, params))
                .collect::<Result<Vec<_>, _>>()?;
            call_builtin(name, &args)
        }
    }
}

fn resolve_path<D: Document + ?Sized>(expr: &Expr, doc: &D) -> Value {
    match expr.field_path() {
        Some(path) if path.len() == 1 && path[0] == "_id" => {
            Value::String(doc.document_id().to_string())
        }
        Some(path) => doc.field(&path).cloned().unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Run a query over an in-memory document set: filter, order, then slice.
///
/// Documents whose sort field is absent or null are dropped once an
/// `order()` stage is present, the same way the application's database
/// excludes them from ordered feeds.
pub fn execute<'d, D: Document>(
    query: &Query,
    docs: impl IntoIterator<Item = &'d D>,
    params: &Params,
) -> Result<Vec<&'d D>, EvalError>
where
    D: 'd,
{
    let mut matched = Vec::new();
    for doc in docs {
        let keep = match &query.filter {
            Some(filter) => eval_filter(filter, doc, params)?,
            None => true,
        };
        let sortable = query
            .order
            .iter()
            .all(|key| sort_value(doc, &key.path).is_some());
        if keep && sortable {
            matched.push(doc);
        }
    }

    if !query.order.is_empty() {
        matched.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|key| {
                    let ord = compare_values(
                        sort_value(*a, &key.path).unwrap_or(&Value::Null),
                        sort_value(*b, &key.path).unwrap_or(&Value::Null),
                    );
                    match key.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.document_id().cmp(b.document_id()))
        });
    }

    if let Some(slice) = query.slice {
        let start = slice.start.min(matched.len());
        let end = slice.end.min(matched.len());
        matched = matched[start..end].to_vec();
    }
    tracing::trace!(results = matched.len(), "executed query in memory");
    Ok(matched)
}

fn sort_value<'a, D: Document + ?Sized>(doc: &'a D, path: &[String]) -> Option<&'a Value> {
    doc.field(path).filter(|v| !v.is_null())
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn timestamp_parts(map: &Map<String, Value>) -> Option<(i64, i64)> {
    let seconds = map.get("_seconds")?.as_i64()?;
    let nanos = map.get("_nanoseconds")?.as_i64()?;
    Some((seconds, nanos))
}

/// Total order over JSON values, ranked null < string < number < bool <
/// array < object. Timestamp objects (`_seconds`/`_nanoseconds`) order
/// chronologically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => match (timestamp_parts(x), timestamp_parts(y)) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => x.len().cmp(&y.len()).then_with(|| {
                x.iter()
                    .zip(y)
                    .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            }),
        },
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
