use crate::ast::{Direction, Expr, OrderKey, Query, Slice};
use crate::lexer::{tokenize, LexError, SpannedToken, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("unexpected token {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        position: usize,
    },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("order() expects a field path")]
    InvalidOrderKey,
    #[error("invalid slice [{0}, {1}]")]
    InvalidSlice(i64, i64),
    #[error("unsupported pipe stage: {0}")]
    UnsupportedStage(String),
}

/// Parse a full query: `*`, `*[filter]`, optionally followed by
/// `| order(path [asc|desc], ...)` stages and a trailing `[start...end]`.
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    let mut parser = Parser::new(tokenize(input)?);
    let query = parser.query()?;
    parser.expect(&Token::Eof)?;
    Ok(query)
}

/// Parse a bare filter expression. A `*[filter]` wrapper is accepted and
/// unwrapped, so lookups can be written either way.
pub fn parse_filter(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(tokenize(input)?);
    let expr = if parser.peek() == &Token::Star {
        parser.advance();
        parser.expect(&Token::LBracket)?;
        let filter = parser.or_expr()?;
        parser.expect(&Token::RBracket)?;
        filter
    } else {
        parser.or_expr()?
    };
    parser.expect(&Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span.start)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Token::Eof => ParseError::UnexpectedEof,
            found => ParseError::UnexpectedToken {
                found: found.to_string(),
                expected: expected.to_string(),
                position: self.position(),
            },
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else if expected == &Token::Eof {
            Err(ParseError::UnexpectedToken {
                found: self.peek().to_string(),
                expected: expected.to_string(),
                position: self.position(),
            })
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn query(&mut self) -> Result<Query, ParseError> {
        self.expect(&Token::Star)?;
        let mut query = Query::default();

        if self.peek() == &Token::LBracket && !self.starts_slice() {
            self.advance();
            query.filter = Some(self.or_expr()?);
            self.expect(&Token::RBracket)?;
        }

        while self.peek() == &Token::Pipe {
            self.advance();
            match self.advance() {
                Token::Ident(name) if name == "order" => {
                    self.expect(&Token::LParen)?;
                    query.order.push(self.order_key()?);
                    while self.peek() == &Token::Comma {
                        self.advance();
                        query.order.push(self.order_key()?);
                    }
                    self.expect(&Token::RParen)?;
                }
                other => return Err(ParseError::UnsupportedStage(other.to_string())),
            }
        }

        if self.peek() == &Token::LBracket {
            query.slice = Some(self.slice()?);
        }

        Ok(query)
    }

    /// `[` followed by an integer and a range operator opens a slice rather
    /// than a filter.
    fn starts_slice(&self) -> bool {
        let next = |offset: usize| self.tokens.get(self.pos + offset).map(|t| &t.token);
        matches!(next(1), Some(Token::Integer(_)))
            && matches!(next(2), Some(Token::Ellipsis | Token::DotDot))
    }

    fn order_key(&mut self) -> Result<OrderKey, ParseError> {
        let path = self
            .primary()?
            .field_path()
            .ok_or(ParseError::InvalidOrderKey)?;
        let direction = match self.peek() {
            Token::Desc => {
                self.advance();
                Direction::Desc
            }
            Token::Asc => {
                self.advance();
                Direction::Asc
            }
            _ => Direction::Asc,
        };
        Ok(OrderKey { path, direction })
    }

    fn slice(&mut self) -> Result<Slice, ParseError> {
        self.expect(&Token::LBracket)?;
        let start = self.integer()?;
        let inclusive = match self.advance() {
            Token::DotDot => true,
            Token::Ellipsis => false,
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("'..' or '...'"));
            }
        };
        let end = self.integer()?;
        self.expect(&Token::RBracket)?;

        let invalid = || ParseError::InvalidSlice(start, end);
        let end_exclusive = if inclusive {
            end.checked_add(1).ok_or_else(invalid)?
        } else {
            end
        };
        if end_exclusive < start {
            return Err(invalid());
        }
        Ok(Slice {
            start: usize::try_from(start).map_err(|_| invalid())?,
            end: usize::try_from(end_exclusive).map_err(|_| invalid())?,
        })
    }

    fn integer(&mut self) -> Result<i64, ParseError> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.peek() == &Token::Or {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        while self.peek() == &Token::And {
            self.advance();
            let right = self.comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.unary()?;
        let make: fn(Box<Expr>, Box<Expr>) -> Expr = match self.peek() {
            Token::Eq => Expr::Eq,
            Token::Neq => Expr::Neq,
            Token::In => Expr::In,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.unary()?;
        Ok(make(Box::new(left), Box::new(right)))
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == &Token::Not {
            self.advance();
            let inner = self.unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                if self.peek() == &Token::LParen {
                    self.advance();
                    let args = self.comma_list(&Token::RParen)?;
                    return Ok(Expr::FuncCall(name, args));
                }
                let mut expr = Expr::Ident(name);
                while self.peek() == &Token::Dot {
                    self.advance();
                    match self.advance() {
                        Token::Ident(field) => expr = Expr::DotAccess(Box::new(expr), field),
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected("field name"));
                        }
                    }
                }
                Ok(expr)
            }
            Token::Param(name) => {
                self.advance();
                Ok(Expr::Param(name))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::StringLiteral(s))
            }
            Token::Integer(n) => {
                self.advance();
                Ok(Expr::IntLiteral(n))
            }
            Token::Float(n) => {
                self.advance();
                Ok(Expr::FloatLiteral(n))
            }
            Token::Bool(b) => {
                self.advance();
                Ok(Expr::BoolLiteral(b))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::LParen => {
                self.advance();
                let expr = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                Ok(Expr::Array(self.comma_list(&Token::RBracket)?))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn comma_list(&mut self, close: &Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.peek() != close {
            items.push(self.or_expr()?);
            while self.peek() == &Token::Comma {
                self.advance();
                items.push(self.or_expr()?);
            }
        }
        self.expect(close)?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn parse_everything() {
        let query = parse_query("*").unwrap();
        assert_eq!(query, Query::default());
    }

    #[test]
    fn parse_feed_query() {
        let query =
            parse_query("*[restaurantId == $restaurantId && isDeleted == false] | order(createdAt desc) [0...50]")
                .unwrap();
        assert_eq!(
            query.filter,
            Some(Expr::And(
                Box::new(Expr::Eq(
                    ident("restaurantId"),
                    Box::new(Expr::Param("restaurantId".into()))
                )),
                Box::new(Expr::Eq(ident("isDeleted"), Box::new(Expr::BoolLiteral(false)))),
            ))
        );
        assert_eq!(
            query.order,
            vec![OrderKey {
                path: vec!["createdAt".into()],
                direction: Direction::Desc,
            }]
        );
        assert_eq!(query.slice, Some(Slice { start: 0, end: 50 }));
    }

    #[test]
    fn inclusive_slice_and_bare_window() {
        let query = parse_query("* | order(_id) [10..19]").unwrap();
        assert_eq!(query.filter, None);
        assert_eq!(query.order[0].direction, Direction::Asc);
        assert_eq!(query.slice, Some(Slice { start: 10, end: 20 }));

        let query = parse_query("*[0...5]").unwrap();
        assert_eq!(query.filter, None);
        assert_eq!(query.slice, Some(Slice { start: 0, end: 5 }));
    }

    #[test]
    fn slice_bounds_at_integer_limit() {
        assert!(matches!(
            parse_query("*[0..9223372036854775807]"),
            Err(ParseError::InvalidSlice(0, i64::MAX))
        ));
        let query = parse_query("*[0...9223372036854775807]").unwrap();
        assert_eq!(query.slice.map(|s| s.start), Some(0));
        assert!(matches!(parse_query("*[5...2]"), Err(ParseError::InvalidSlice(5, 2))));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse_filter("a == 1 || b == 2 && c == 3").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parse_membership_and_functions() {
        let expr = parse_filter("\"a.jpg\" in media.photos && !defined(isDeleted)").unwrap();
        let Expr::And(left, right) = expr else {
            panic!("expected And");
        };
        assert_eq!(
            *left,
            Expr::In(
                Box::new(Expr::StringLiteral("a.jpg".into())),
                Box::new(Expr::DotAccess(ident("media"), "photos".into())),
            )
        );
        assert_eq!(
            *right,
            Expr::Not(Box::new(Expr::FuncCall(
                "defined".into(),
                vec![Expr::Ident("isDeleted".into())]
            )))
        );
    }

    #[test]
    fn filter_accepts_star_wrapper() {
        assert_eq!(
            parse_filter("*[userId == \"u1\"]").unwrap(),
            parse_filter("userId == \"u1\"").unwrap()
        );
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse_filter("userId =="), Err(ParseError::UnexpectedEof)));
        assert!(matches!(
            parse_filter("userId == \"u1\" ]"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_query("* | score(x)"),
            Err(ParseError::UnsupportedStage(_))
        ));
        assert!(matches!(
            parse_query("* | order(\"x\")"),
            Err(ParseError::InvalidOrderKey)
        ));
        assert!(matches!(parse_query("*[5...2]"), Err(ParseError::InvalidSlice(5, 2))));
    }
}
