//! Condition evaluation for conditional tuples.

use crate::cel::{CelContext, CelValue};
use crate::error::{DomainError, DomainResult};
use crate::model::{RelationshipCondition, Tuple};

use super::context::QueryScope;

impl QueryScope {
    /// Returns whether a tuple applies under this query's context.
    ///
    /// Unconditional tuples always apply. For conditional tuples the request
    /// context is merged with the tuple's own context, the tuple's values
    /// winning, and the condition expression must evaluate to `true`.
    ///
    /// # Errors
    ///
    /// `ConditionError` if the condition is not defined, a declared
    /// parameter is missing or has the wrong type, or evaluation fails.
    pub(crate) fn tuple_applies(&self, tuple: &Tuple) -> DomainResult<bool> {
        match &tuple.condition {
            None => Ok(true),
            Some(condition) => self.evaluate_condition(condition),
        }
    }

    fn evaluate_condition(&self, condition: &RelationshipCondition) -> DomainResult<bool> {
        let error = |message: String| DomainError::ConditionError {
            condition: condition.name.clone(),
            message,
        };

        let compiled = self
            .types
            .condition(&condition.name)
            .ok_or_else(|| error("condition is not defined in the model".to_string()))?;

        // Tuple context takes precedence: values written with the tuple cannot
        // be overridden by the caller.
        let mut merged = (*self.context).clone();
        merged.extend(
            condition
                .context
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut cel_ctx = CelContext::new();
        for (name, param_type) in &compiled.definition.parameters {
            let value = merged
                .get(name)
                .ok_or_else(|| error(format!("missing required parameter '{name}'")))?;
            let value = CelValue::from_typed_json(value, *param_type)
                .map_err(|e| error(format!("parameter '{name}': {e}")))?;
            cel_ctx.set(name.clone(), value);
        }
        // Undeclared values are still visible to the expression.
        for (name, value) in &merged {
            if !compiled.definition.parameters.contains_key(name) {
                cel_ctx.set(name.clone(), CelValue::from_json(value));
            }
        }

        compiled
            .expression
            .evaluate_bool(&cel_ctx)
            .map_err(|e| error(e.to_string()))
    }
}
