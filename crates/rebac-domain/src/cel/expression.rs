//! CEL expression parsing and representation

use std::panic;

use cel_interpreter::{Program, Value};

use super::context::CelContext;
use super::{CelError, CelResult};

/// A parsed CEL (Common Expression Language) expression
///
/// Holds a compiled program that can be evaluated any number of times
/// against different contexts.
pub struct CelExpression {
    source: String,
    program: Program,
}

impl std::fmt::Debug for CelExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CelExpression")
            .field("source", &self.source)
            .finish()
    }
}

impl CelExpression {
    /// Parse a CEL expression string into a CelExpression
    ///
    /// # Errors
    ///
    /// Returns `CelError::ParseError` for invalid CEL syntax.
    pub fn parse(expression: &str) -> CelResult<Self> {
        // The underlying parser may panic on some malformed input.
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| Program::compile(expression)));

        let program = match result {
            Ok(Ok(program)) => program,
            Ok(Err(e)) => {
                return Err(CelError::ParseError {
                    expression: expression.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_panic) => {
                return Err(CelError::ParseError {
                    expression: expression.to_string(),
                    message: "parser failed on this expression".to_string(),
                });
            }
        };

        Ok(Self {
            source: expression.to_string(),
            program,
        })
    }

    /// Returns the original source expression
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression and require a boolean result.
    pub fn evaluate_bool(&self, context: &CelContext) -> CelResult<bool> {
        let cel_ctx = context.to_cel_context();
        let result = self
            .program
            .execute(&cel_ctx)
            .map_err(|e| CelError::EvaluationError {
                expression: self.source.clone(),
                message: e.to_string(),
            })?;

        match result {
            Value::Bool(b) => Ok(b),
            other => Err(CelError::TypeError {
                expected: "bool".to_string(),
                actual: format!("{other:?}"),
            }),
        }
    }
}
