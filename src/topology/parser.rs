//! Recursive-descent parser for topology expressions.
//!
//! Grammar (`+` binds tighter than `->`, both left-associative):
//!
//! ```text
//! stack     := superpose ( "->" superpose )*
//! superpose := primary ( "+" primary )*
//! primary   := NAME | "(" stack ")"
//! ```
//!
//! The left operand of `->` is the physically lower component: `ph1->ch1` means
//! light leaving `ph1` enters `ch1`. Nested groups of the same operator are
//! flattened, so `a->(b->c)` and `a->b->c` produce the same tree.

use crate::error::ParseError;
use crate::topology::lexer::{Token, TokenKind, tokenize};

/// Syntax tree of a topology expression (before name resolution).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Atmosphere { name: String, position: usize },
    Stack(Vec<Expr>),
    Superpose(Vec<Expr>),
}

impl Expr {
    /// Visit every atmosphere reference in expression order.
    pub fn for_each_atmosphere<F: FnMut(&str, usize)>(&self, f: &mut F) {
        match self {
            Expr::Atmosphere { name, position } => f(name, *position),
            Expr::Stack(items) | Expr::Superpose(items) => {
                for item in items {
                    item.for_each_atmosphere(f);
                }
            }
        }
    }
}

pub fn parse_expression(expression: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        open: Vec::new(),
    };
    let expr = parser.stack()?;

    if let Some(token) = parser.next() {
        return Err(match token.kind {
            TokenKind::Close => ParseError::UnbalancedParenthesis {
                token: ')',
                position: token.position,
            },
            other => ParseError::UnexpectedToken {
                token: other.text(),
                position: token.position,
            },
        });
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    /// Positions of currently open parentheses.
    open: Vec<usize>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn stack(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.superpose(None)?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Stack, .. })) {
            let op = self.next();
            items.push(self.superpose(op.as_ref())?);
        }
        Ok(flatten(items, true))
    }

    fn superpose(&mut self, after: Option<&Token>) -> Result<Expr, ParseError> {
        let mut items = vec![self.primary(after)?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Superpose, .. })) {
            let op = self.next();
            items.push(self.primary(op.as_ref())?);
        }
        Ok(flatten(items, false))
    }

    /// `after` is the operator that precedes this operand, if any.
    fn primary(&mut self, after: Option<&Token>) -> Result<Expr, ParseError> {
        let dangling = |op: &Token| ParseError::DanglingOperator {
            operator: op.kind.text(),
            position: op.position,
        };

        let Some(token) = self.next() else {
            return Err(match (after, self.open.last()) {
                (Some(op), _) => dangling(op),
                (None, Some(&position)) => ParseError::UnbalancedParenthesis { token: '(', position },
                (None, None) => ParseError::Empty,
            });
        };

        match token.kind {
            TokenKind::Name(name) => Ok(Expr::Atmosphere {
                name,
                position: token.position,
            }),
            TokenKind::Open => {
                self.open.push(token.position);
                let inner = self.stack()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Close,
                        ..
                    }) => {
                        self.open.pop();
                        Ok(inner)
                    }
                    Some(other) => Err(ParseError::UnexpectedToken {
                        token: other.kind.text(),
                        position: other.position,
                    }),
                    None => Err(ParseError::UnbalancedParenthesis {
                        token: '(',
                        position: token.position,
                    }),
                }
            }
            TokenKind::Stack | TokenKind::Superpose => Err(dangling(after.unwrap_or(&token))),
            TokenKind::Close => Err(match after {
                Some(op) => dangling(op),
                None if self.open.is_empty() => ParseError::UnbalancedParenthesis {
                    token: ')',
                    position: token.position,
                },
                None => ParseError::UnexpectedToken {
                    token: ")".to_string(),
                    position: token.position,
                },
            }),
        }
    }
}

/// Collapse single-item groups and splice same-operator children.
fn flatten(items: Vec<Expr>, stack: bool) -> Expr {
    if items.len() == 1 {
        return items.into_iter().next().unwrap_or(Expr::Stack(Vec::new()));
    }
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Expr::Stack(inner) if stack => out.extend(inner),
            Expr::Superpose(inner) if !stack => out.extend(inner),
            other => out.push(other),
        }
    }
    if stack {
        Expr::Stack(out)
    } else {
        Expr::Superpose(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, position: usize) -> Expr {
        Expr::Atmosphere {
            name: name.to_string(),
            position,
        }
    }

    #[test]
    fn superposition_binds_tighter_than_stacking() {
        let expr = parse_expression("ph1->ch1+ch2").unwrap();
        assert_eq!(
            expr,
            Expr::Stack(vec![
                leaf("ph1", 0),
                Expr::Superpose(vec![leaf("ch1", 5), leaf("ch2", 9)]),
            ])
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse_expression("(ph1->ch1)+te1").unwrap();
        assert_eq!(
            expr,
            Expr::Superpose(vec![
                Expr::Stack(vec![leaf("ph1", 1), leaf("ch1", 6)]),
                leaf("te1", 11),
            ])
        );
    }

    #[test]
    fn nested_stacks_are_flattened() {
        let a = parse_expression("a->(b->c)").unwrap();
        let b = parse_expression("a->b->c").unwrap();
        let names = |e: &Expr| {
            let mut out = Vec::new();
            e.for_each_atmosphere(&mut |n, _| out.push(n.to_string()));
            out
        };
        assert!(matches!(a, Expr::Stack(ref v) if v.len() == 3));
        assert!(matches!(b, Expr::Stack(ref v) if v.len() == 3));
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn malformed_expressions_fail_with_distinct_errors() {
        assert_eq!(parse_expression("   ").unwrap_err(), ParseError::Empty);
        assert_eq!(
            parse_expression("ph1->").unwrap_err(),
            ParseError::DanglingOperator {
                operator: "->".to_string(),
                position: 3
            }
        );
        assert_eq!(
            parse_expression("+ch1").unwrap_err(),
            ParseError::DanglingOperator {
                operator: "+".to_string(),
                position: 0
            }
        );
        assert_eq!(
            parse_expression("(ph1->ch1").unwrap_err(),
            ParseError::UnbalancedParenthesis {
                token: '(',
                position: 0
            }
        );
        assert_eq!(
            parse_expression("ph1)").unwrap_err(),
            ParseError::UnbalancedParenthesis {
                token: ')',
                position: 3
            }
        );
        assert_eq!(
            parse_expression("ph1 ch1").unwrap_err(),
            ParseError::UnexpectedToken {
                token: "ch1".to_string(),
                position: 4
            }
        );
        // Two operators in a row: the first one lacks its right operand.
        assert_eq!(
            parse_expression("a -> + b").unwrap_err(),
            ParseError::DanglingOperator {
                operator: "->".to_string(),
                position: 2
            }
        );
        assert_eq!(
            parse_expression("(ph1->)").unwrap_err(),
            ParseError::DanglingOperator {
                operator: "->".to_string(),
                position: 4
            }
        );
    }
}
