use serde::{Deserialize, Serialize};

/// Filter expression tree for the GROQ subset used against review documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Literals
    StringLiteral(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    Null,
    Array(Vec<Expr>),

    // Field access
    Ident(String),
    DotAccess(Box<Expr>, String),
    Param(String),

    // Comparison
    Eq(Box<Expr>, Box<Expr>),
    Neq(Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),

    // Logic
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    FuncCall(String, Vec<Expr>),
}

impl Expr {
    /// The field path named by an identifier or dot-access chain, e.g.
    /// `media.photos` becomes `["media", "photos"]`.
    pub fn field_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::Ident(name) => Some(vec![name.clone()]),
            Expr::DotAccess(base, field) => {
                let mut path = base.field_path()?;
                path.push(field.clone());
                Some(path)
            }
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::StringLiteral(_)
                | Expr::IntLiteral(_)
                | Expr::FloatLiteral(_)
                | Expr::BoolLiteral(_)
                | Expr::Null
                | Expr::Param(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub path: Vec<String>,
    pub direction: Direction,
}

/// Half-open result window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed `*[filter] | order(...) [a...b]` query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Option<Expr>,
    pub order: Vec<OrderKey>,
    pub slice: Option<Slice>,
}

impl Query {
    /// Replace the result window, keeping filter and ordering.
    pub fn with_window(mut self, start: usize, len: usize) -> Self {
        self.slice = Some(Slice {
            start,
            end: start + len,
        });
        self
    }
}
