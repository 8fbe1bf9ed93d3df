use std::fmt;

/// Tokens of the GROQ filter subset.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,

    Ident(String),
    /// `$name`
    Param(String),

    Eq,  // ==
    Neq, // !=
    And, // &&
    Or,  // ||
    Not, // !
    In,
    Asc,
    Desc,

    Star,     // *
    Dot,      // .
    DotDot,   // ..
    Ellipsis, // ...
    Comma,
    Pipe, // |

    LParen,
    RParen,
    LBracket,
    RBracket,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Null => write!(f, "null"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Param(s) => write!(f, "${s}"),
            Token::Eq => write!(f, "=="),
            Token::Neq => write!(f, "!="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::In => write!(f, "in"),
            Token::Asc => write!(f, "asc"),
            Token::Desc => write!(f, "desc"),
            Token::Star => write!(f, "*"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::Ellipsis => write!(f, "..."),
            Token::Comma => write!(f, ","),
            Token::Pipe => write!(f, "|"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Byte offsets of a token in the source query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),
    #[error("invalid number '{0}' at position {1}")]
    InvalidNumber(String, usize),
    #[error("empty parameter name at position {0}")]
    EmptyParam(usize),
}

struct Cursor<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|&(_, c)| c)
    }

    /// Byte offset of the current char, or the input length at the end.
    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while self.peek_at(0).is_some_and(&pred) {
            self.pos += 1;
        }
        &self.input[start..self.offset()]
    }
}

/// Tokenize a query or filter string.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut cur = Cursor::new(input);
    let mut tokens = Vec::new();

    while let Some(ch) = cur.peek_at(0) {
        if ch.is_whitespace() {
            cur.bump(1);
            continue;
        }
        if ch == '/' && cur.peek_at(1) == Some('/') {
            cur.take_while(|c| c != '\n');
            continue;
        }

        let start = cur.offset();
        let token = match ch {
            '*' => single(&mut cur, Token::Star),
            ',' => single(&mut cur, Token::Comma),
            '(' => single(&mut cur, Token::LParen),
            ')' => single(&mut cur, Token::RParen),
            '[' => single(&mut cur, Token::LBracket),
            ']' => single(&mut cur, Token::RBracket),
            '.' => match (cur.peek_at(1), cur.peek_at(2)) {
                (Some('.'), Some('.')) => {
                    cur.bump(3);
                    Token::Ellipsis
                }
                (Some('.'), _) => {
                    cur.bump(2);
                    Token::DotDot
                }
                _ => single(&mut cur, Token::Dot),
            },
            '=' if cur.peek_at(1) == Some('=') => double(&mut cur, Token::Eq),
            '!' if cur.peek_at(1) == Some('=') => double(&mut cur, Token::Neq),
            '!' => single(&mut cur, Token::Not),
            '&' if cur.peek_at(1) == Some('&') => double(&mut cur, Token::And),
            '|' if cur.peek_at(1) == Some('|') => double(&mut cur, Token::Or),
            '|' => single(&mut cur, Token::Pipe),
            '"' | '\'' => lex_string(&mut cur, ch, start)?,
            '-' if cur.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                cur.bump(1);
                lex_number(&mut cur, start)?
            }
            c if c.is_ascii_digit() => lex_number(&mut cur, start)?,
            '$' => {
                cur.bump(1);
                let name = cur.take_while(is_ident_char);
                if name.is_empty() {
                    return Err(LexError::EmptyParam(start));
                }
                Token::Param(name.to_string())
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = cur.take_while(is_ident_char);
                match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    "in" => Token::In,
                    "asc" => Token::Asc,
                    "desc" => Token::Desc,
                    _ => Token::Ident(word.to_string()),
                }
            }
            _ => return Err(LexError::UnexpectedChar(ch, start)),
        };

        tokens.push(SpannedToken {
            token,
            span: Span {
                start,
                end: cur.offset(),
            },
        });
    }

    let end = input.len();
    tokens.push(SpannedToken {
        token: Token::Eof,
        span: Span { start: end, end },
    });
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn single(cur: &mut Cursor<'_>, token: Token) -> Token {
    cur.bump(1);
    token
}

fn double(cur: &mut Cursor<'_>, token: Token) -> Token {
    cur.bump(2);
    token
}

fn lex_string(cur: &mut Cursor<'_>, quote: char, start: usize) -> Result<Token, LexError> {
    cur.bump(1);
    let mut out = String::new();
    loop {
        match cur.peek_at(0) {
            None => return Err(LexError::UnterminatedString(start)),
            Some(c) if c == quote => {
                cur.bump(1);
                return Ok(Token::String(out));
            }
            Some('\\') => {
                let escaped = cur
                    .peek_at(1)
                    .ok_or(LexError::UnterminatedString(start))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                cur.bump(2);
            }
            Some(c) => {
                out.push(c);
                cur.bump(1);
            }
        }
    }
}

fn lex_number(cur: &mut Cursor<'_>, start: usize) -> Result<Token, LexError> {
    cur.take_while(|c| c.is_ascii_digit());
    // A single dot followed by a digit is a decimal point; `..` is a range.
    let is_float = cur.peek_at(0) == Some('.') && cur.peek_at(1).is_some_and(|c| c.is_ascii_digit());
    if is_float {
        cur.bump(1);
        cur.take_while(|c| c.is_ascii_digit());
    }
    let text = &cur.input[start..cur.offset()];
    let invalid = || LexError::InvalidNumber(text.to_string(), start);
    if is_float {
        text.parse().map(Token::Float).map_err(|_| invalid())
    } else {
        text.parse().map(Token::Integer).map_err(|_| invalid())
    }
}
