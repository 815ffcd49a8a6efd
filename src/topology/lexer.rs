//! Tokenizer for topology expressions.
//!
//! Tokens:
//! - atmosphere names `[A-Za-z_][A-Za-z0-9_]*`
//! - `->` (sequential stacking) and `+` (additive superposition)
//! - `(` and `)`
//!
//! Whitespace is skipped. Every token keeps its byte offset for error reporting.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Name(String),
    Stack,
    Superpose,
    Open,
    Close,
}

impl TokenKind {
    pub fn text(&self) -> String {
        match self {
            TokenKind::Name(name) => name.clone(),
            TokenKind::Stack => "->".to_string(),
            TokenKind::Superpose => "+".to_string(),
            TokenKind::Open => "(".to_string(),
            TokenKind::Close => ")".to_string(),
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, TokenKind::Stack | TokenKind::Superpose)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub fn tokenize(expression: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '+' => TokenKind::Superpose,
            '(' => TokenKind::Open,
            ')' => TokenKind::Close,
            '-' => match chars.peek() {
                Some((_, '>')) => {
                    chars.next();
                    TokenKind::Stack
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: "-".to_string(),
                        position,
                    });
                }
            },
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Name(name)
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    token: other.to_string(),
                    position,
                });
            }
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}
