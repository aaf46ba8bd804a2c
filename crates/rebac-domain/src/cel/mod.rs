//! CEL (Common Expression Language) evaluation module
//!
//! Conditions attach attribute checks to relationship tuples. A model
//! declares a named condition with typed parameters; a tuple references it
//! by name and may bind some parameters itself. At query time the tuple's
//! values are merged over the request context and the expression must
//! evaluate to `true` for the tuple to count.
//!
//! ```text
//! condition office_hours(hour: int) { hour >= 9 && hour < 17 }
//!
//! document:plan#viewer@user:alice [office_hours]
//! Check(user:alice, viewer, document:plan, context: {hour: 10})  -> true
//! ```

mod context;
mod error;
mod expression;

pub use context::{CelContext, CelValue};
pub use error::CelError;
pub use expression::CelExpression;

/// Result type for CEL operations
pub type CelResult<T> = Result<T, CelError>;
