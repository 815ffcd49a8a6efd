//! Topology expressions: how atmospheres combine inside one spectral region.
//!
//! - `a -> b` stacks `b` on top of `a` (light leaving `a` illuminates `b`)
//! - `a + b` superposes independent contributions sharing the same incoming light
//! - parentheses group
//!
//! [`parse`] validates names against the atmospheres in scope and returns a
//! [`CompositionPlan`] with a deterministic evaluation order.

pub mod lexer;
pub mod parser;
pub mod plan;

use std::collections::HashSet;

use crate::error::ParseError;

pub use parser::{Expr, parse_expression};
pub use plan::{CompositionPlan, Node, NodeId, Step};

/// Parse `expression` with every known atmosphere at the same height.
///
/// Independent atmospheres are then ordered by their position in the expression.
pub fn parse(expression: &str, known_names: &[&str]) -> Result<CompositionPlan, ParseError> {
    parse_with_heights(expression, known_names, |_| 0.0)
}

/// Parse `expression`, ordering independent atmospheres by `height_of` first.
pub fn parse_with_heights(
    expression: &str,
    known_names: &[&str],
    height_of: impl Fn(&str) -> f64,
) -> Result<CompositionPlan, ParseError> {
    let expr = parse_expression(expression)?;
    validate_names(&expr, known_names)?;
    Ok(CompositionPlan::build(&expr, height_of))
}

/// Reject unknown names and repeated references, reporting the first offender.
fn validate_names(expr: &Expr, known_names: &[&str]) -> Result<(), ParseError> {
    let mut seen = HashSet::new();
    let mut first_error = None;
    expr.for_each_atmosphere(&mut |name, position| {
        if first_error.is_some() {
            return;
        }
        if !known_names.contains(&name) {
            first_error = Some(ParseError::UnknownAtmosphere {
                name: name.to_string(),
                position,
            });
        } else if !seen.insert(name.to_string()) {
            first_error = Some(ParseError::DuplicateReference {
                name: name.to_string(),
                position,
            });
        }
    });
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
