// Translation of GROQ filters into JSONB predicates. Filters outside the
// translatable subset return `None` and are evaluated in memory instead.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use review_lake_groq::{Expr, Params};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Column {
    Id,
    Content(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Const(bool),
    Eq(Column, Value),
    Neq(Column, Value),
    /// `"v" in field`
    Contains(Vec<String>, Value),
    /// `field in ["a", "b"]`
    OneOf(Column, Vec<Value>),
    Defined(Vec<String>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

fn column(expr: &Expr) -> Option<Column> {
    let path = expr.field_path()?;
    if path.len() == 1 && path[0] == "_id" {
        Some(Column::Id)
    } else {
        Some(Column::Content(path))
    }
}

/// A literal or bound parameter that is not an array or object.
fn scalar(expr: &Expr, params: &Params) -> Option<Value> {
    let value = match expr {
        Expr::StringLiteral(s) => Value::String(s.clone()),
        Expr::IntLiteral(n) => Value::from(*n),
        Expr::FloatLiteral(n) => Value::from(*n),
        Expr::BoolLiteral(b) => Value::Bool(*b),
        Expr::Null => Value::Null,
        Expr::Param(name) => params.get(name)?.clone(),
        _ => return None,
    };
    (!value.is_array() && !value.is_object()).then_some(value)
}

fn comparison(left: &Expr, right: &Expr, params: &Params) -> Option<(Column, Value)> {
    match (column(left), column(right)) {
        (Some(col), None) => Some((col, scalar(right, params)?)),
        (None, Some(col)) => Some((col, scalar(left, params)?)),
        _ => None,
    }
}

pub(crate) fn translate(expr: &Expr, params: &Params) -> Option<Predicate> {
    let predicate = match expr {
        Expr::BoolLiteral(b) => Predicate::Const(*b),
        Expr::Eq(l, r) => match comparison(l, r, params)? {
            (Column::Id, Value::String(id)) => Predicate::Eq(Column::Id, Value::String(id)),
            (Column::Id, _) => Predicate::Const(false),
            (col, value) => Predicate::Eq(col, value),
        },
        Expr::Neq(l, r) => match comparison(l, r, params)? {
            (Column::Id, Value::String(id)) => Predicate::Neq(Column::Id, Value::String(id)),
            (Column::Id, _) => Predicate::Const(true),
            (col, value) => Predicate::Neq(col, value),
        },
        Expr::In(needle, haystack) => match (column(needle), column(haystack)) {
            (None, Some(Column::Content(path))) => {
                let value = scalar(needle, params)?;
                if value.is_null() {
                    return None;
                }
                Predicate::Contains(path, value)
            }
            (Some(col), None) => {
                let Expr::Array(items) = haystack.as_ref() else {
                    return None;
                };
                let values = items
                    .iter()
                    .map(|item| scalar(item, params).filter(|v| !v.is_null()))
                    .collect::<Option<Vec<_>>>()?;
                Predicate::OneOf(col, values)
            }
            _ => return None,
        },
        Expr::And(l, r) => Predicate::And(
            Box::new(translate(l, params)?),
            Box::new(translate(r, params)?),
        ),
        Expr::Or(l, r) => Predicate::Or(
            Box::new(translate(l, params)?),
            Box::new(translate(r, params)?),
        ),
        Expr::Not(inner) => Predicate::Not(Box::new(translate(inner, params)?)),
        Expr::FuncCall(name, args) if name == "defined" && args.len() == 1 => {
            match column(&args[0])? {
                Column::Id => Predicate::Const(true),
                Column::Content(path) => Predicate::Defined(path),
            }
        }
        _ => return None,
    };
    Some(predicate)
}

fn push_path(builder: &mut QueryBuilder<'_, Postgres>, path: &[String]) {
    builder
        .push("(content #> ")
        .push_bind(path.to_vec())
        .push("::text[])");
}

fn push_json(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    builder.push_bind(Json(value.clone())).push("::jsonb");
}

/// Present and not JSON null.
pub(crate) fn push_defined(builder: &mut QueryBuilder<'_, Postgres>, path: &[String]) {
    builder.push("(");
    push_path(builder, path);
    builder.push(" IS NOT NULL AND ");
    push_path(builder, path);
    builder.push(" <> 'null'::jsonb)");
}

pub(crate) fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::Const(true) => {
            builder.push("TRUE");
        }
        Predicate::Const(false) => {
            builder.push("FALSE");
        }
        Predicate::Eq(Column::Id, value) => {
            builder
                .push("document_id = ")
                .push_bind(value.as_str().unwrap_or_default().to_string());
        }
        Predicate::Neq(Column::Id, value) => {
            builder
                .push("document_id <> ")
                .push_bind(value.as_str().unwrap_or_default().to_string());
        }
        Predicate::Eq(Column::Content(path), Value::Null) => {
            builder.push("NOT ");
            push_defined(builder, path);
        }
        Predicate::Neq(Column::Content(path), Value::Null) => push_defined(builder, path),
        Predicate::Eq(Column::Content(path), value) => {
            builder.push("COALESCE(");
            push_path(builder, path);
            builder.push(" = ");
            push_json(builder, value);
            builder.push(", FALSE)");
        }
        Predicate::Neq(Column::Content(path), value) => {
            builder.push("(");
            push_path(builder, path);
            builder.push(" IS DISTINCT FROM ");
            push_json(builder, value);
            builder.push(")");
        }
        Predicate::Contains(path, value) => {
            builder.push("COALESCE(jsonb_typeof");
            push_path(builder, path);
            builder.push(" = 'array' AND ");
            push_path(builder, path);
            builder.push(" @> jsonb_build_array(");
            push_json(builder, value);
            builder.push("), FALSE)");
        }
        Predicate::OneOf(_, values) if values.is_empty() => {
            builder.push("FALSE");
        }
        Predicate::OneOf(Column::Id, values) => {
            let ids: Vec<String> = values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            builder.push("document_id = ANY(").push_bind(ids).push(")");
        }
        Predicate::OneOf(Column::Content(path), values) => {
            builder.push("COALESCE(");
            push_path(builder, path);
            builder.push(" IN (");
            let mut separated = builder.separated(", ");
            for value in values {
                separated.push_bind(Json(value.clone())).push_unseparated("::jsonb");
            }
            builder.push("), FALSE)");
        }
        Predicate::Defined(path) => push_defined(builder, path),
        Predicate::And(l, r) => push_binary(builder, l, " AND ", r),
        Predicate::Or(l, r) => push_binary(builder, l, " OR ", r),
        Predicate::Not(inner) => {
            builder.push("(NOT ");
            push_predicate(builder, inner);
            builder.push(")");
        }
    }
}

fn push_binary(
    builder: &mut QueryBuilder<'_, Postgres>,
    left: &Predicate,
    op: &str,
    right: &Predicate,
) {
    builder.push("(");
    push_predicate(builder, left);
    builder.push(op);
    push_predicate(builder, right);
    builder.push(")");
}
