//! A small GROQ dialect for review documents: filters such as
//! `userId == "u1"` or `"a.jpg" in images`, and feed queries such as
//! `*[isDeleted == false] | order(createdAt desc) [0...50]`.

pub mod ast;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use ast::{Direction, Expr, OrderKey, Query, Slice};
pub use eval::{eval_filter, execute, Document, EvalError, Params};
pub use parser::{parse_filter, parse_query, ParseError};
