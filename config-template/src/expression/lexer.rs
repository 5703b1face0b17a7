// Expression Lexer
// Tokenizes template expressions and splits strings on <$ ... $> delimiters

use std::fmt;

/// Prefix that marks a string as literal text that must never be evaluated
pub const ESCAPE_PREFIX: &str = "$! ";

/// Opening delimiter of an embedded expression
pub const OPEN_DELIMITER: &str = "<$";

/// Closing delimiter of an embedded expression
pub const CLOSE_DELIMITER: &str = "$>";

/// Token types for template expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Null,
    True,
    False,
    Number(f64),
    String(String),

    Identifier(String),

    // Operators
    Plus,        // +
    Minus,       // -
    Star,        // *
    Slash,       // /
    Percent,     // %
    Eq,          // == or ===
    Ne,          // != or !==
    Lt,          // <
    Le,          // <=
    Gt,          // >
    Ge,          // >=
    And,         // &&
    Or,          // ||
    Nullish,     // ??
    Not,         // !
    Dot,         // .
    OptionalDot, // ?.
    Comma,       // ,
    Colon,       // :
    Question,    // ?

    // Delimiters
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => write!(f, "null"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Number(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Nullish => write!(f, "??"),
            Token::Not => write!(f, "!"),
            Token::Dot => write!(f, "."),
            Token::OptionalDot => write!(f, "?."),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Question => write!(f, "?"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer error
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lex error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for LexError {}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        self.position = pos;

        if ch == '.' && self.digit_after_next() {
            return self.read_number();
        }

        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '=' => {
                self.advance();
                if self.peek_char() != Some('=') {
                    return Err(self.error_at("assignment is not supported, expected '=='", pos));
                }
                self.advance();
                // === is accepted as an alias for ==
                if self.peek_char() == Some('=') {
                    self.advance();
                }
                Ok(Token::Eq)
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                    }
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Not)
                }
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            '&' => {
                self.advance();
                if self.peek_char() == Some('&') {
                    self.advance();
                    Ok(Token::And)
                } else {
                    Err(self.error_at("expected '&&' operator", pos))
                }
            }
            '|' => {
                self.advance();
                if self.peek_char() == Some('|') {
                    self.advance();
                    Ok(Token::Or)
                } else {
                    Err(self.error_at("expected '||' operator", pos))
                }
            }
            '?' => {
                self.advance();
                match self.peek_char() {
                    Some('?') => {
                        self.advance();
                        Ok(Token::Nullish)
                    }
                    // `a ? .5 : 1` is a ternary, not an optional member
                    Some('.') if !self.digit_after_next() => {
                        self.advance();
                        Ok(Token::OptionalDot)
                    }
                    _ => Ok(Token::Question),
                }
            }

            '\'' | '"' => self.read_string(ch),

            '0'..='9' => self.read_number(),

            'a'..='z' | 'A'..='Z' | '_' | '$' => self.read_identifier(),

            _ => Err(self.error_at(&format!("unexpected character: '{}'", ch), pos)),
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn digit_after_next(&self) -> bool {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        matches!(lookahead.peek(), Some(&(_, c)) if c.is_ascii_digit())
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error_at(&self, message: &str, position: usize) -> LexError {
        LexError {
            message: message.to_string(),
            position,
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let start = self.position;
        self.advance(); // opening quote

        let mut value = String::new();

        loop {
            match self.advance() {
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => match self.advance() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, other)) => value.push(other),
                    None => return Err(self.error_at("unterminated string", start)),
                },
                Some((_, c)) => value.push(c),
                None => return Err(self.error_at("unterminated string", start)),
            }
        }

        Ok(Token::String(value))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let mut num_str = String::new();

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // A '.' only continues the number when a digit follows it,
        // otherwise it is member access on the literal
        if self.peek_char() == Some('.') && self.digit_after_next() {
            num_str.push('.');
            self.advance();
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_digit() {
                    num_str.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error_at(&format!("invalid number: {}", num_str), start))
    }

    fn read_identifier(&mut self) -> Result<Token, LexError> {
        let mut ident = String::new();

        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let token = match ident.as_str() {
            "null" | "undefined" => Token::Null,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Identifier(ident),
        };

        Ok(token)
    }
}

/// A piece of a template string
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text outside any delimiter pair
    Text(String),
    /// Trimmed source of an embedded expression
    Expr(String),
}

/// How a string value is to be treated by the evaluator
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateKind {
    /// `$! ...`: the remainder, never evaluated
    Literal(String),
    /// The whole string is exactly one delimited expression
    Whole(String),
    /// Text with one or more embedded expressions
    Interpolated(Vec<Segment>),
    /// No delimiters at all
    Plain,
}

/// Classify a string according to the delimiter contract
pub fn classify(input: &str) -> TemplateKind {
    if let Some(rest) = input.strip_prefix(ESCAPE_PREFIX) {
        return TemplateKind::Literal(rest.to_string());
    }

    let mut segments = split_template(input);
    let has_expr = segments.iter().any(|s| matches!(s, Segment::Expr(_)));

    match segments.as_slice() {
        [Segment::Expr(_)] => match segments.pop() {
            Some(Segment::Expr(expr)) => TemplateKind::Whole(expr),
            _ => TemplateKind::Plain,
        },
        _ if has_expr => TemplateKind::Interpolated(segments),
        _ => TemplateKind::Plain,
    }
}

/// Split a string into literal text and `<$ ... $>` expression segments
pub fn split_template(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = input;

    while let Some(open) = rest.find(OPEN_DELIMITER) {
        let body_start = open + OPEN_DELIMITER.len();
        let Some(close) = find_close(&rest[body_start..]) else {
            break;
        };

        text.push_str(&rest[..open]);
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }

        let body = &rest[body_start..body_start + close];
        segments.push(Segment::Expr(body.trim().to_string()));
        rest = &rest[body_start + close + CLOSE_DELIMITER.len()..];
    }

    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    segments
}

/// Byte offset of the closing delimiter, skipping quoted string literals
fn find_close(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, ch) in body.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                } else if body[i..].starts_with(CLOSE_DELIMITER) {
                    return Some(i);
                }
            }
        }
    }

    None
}
