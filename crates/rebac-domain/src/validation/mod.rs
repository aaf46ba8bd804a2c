//! Authorization model validation.
//!
//! Validates that authorization models are semantically correct before
//! they are stored:
//! - Types, relations and conditions are uniquely named
//! - Every referenced type, relation and condition exists
//! - Tuplesets are directly assignable relations
//! - Condition expressions compile
//!
//! Self-referential relation graphs are accepted; the resolver bounds them
//! at query time.

use std::collections::{HashMap, HashSet};

use crate::cel::CelExpression;
use crate::model::{AuthorizationModel, TypeConstraint, TypeDefinition, Userset};

/// Validation error types
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Empty model (no type definitions)
    EmptyModel,
    /// Two type definitions share a name
    DuplicateType { type_name: String },
    /// Two relations on one type share a name
    DuplicateRelation {
        type_name: String,
        relation_name: String,
    },
    /// Two conditions share a name
    DuplicateCondition { condition_name: String },
    /// A referenced relation does not exist
    UndefinedRelation {
        type_name: String,
        relation_name: String,
        referenced_relation: String,
    },
    /// Type constraint references an undefined type or relation
    InvalidTypeConstraint {
        type_name: String,
        relation_name: String,
        invalid_type: String,
    },
    /// A tupleset relation is not a plain direct relation
    InvalidTupleset {
        type_name: String,
        relation_name: String,
        tupleset: String,
    },
    /// Condition referenced in type constraint does not exist
    UndefinedCondition {
        type_name: String,
        relation_name: String,
        condition_name: String,
    },
    /// Condition expression is not valid CEL
    InvalidConditionExpression {
        condition_name: String,
        error_message: String,
    },
    /// Union or intersection without operands
    EmptySetOperation {
        type_name: String,
        relation_name: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyModel => {
                write!(f, "model must have at least one type definition")
            }
            ValidationError::DuplicateType { type_name } => {
                write!(f, "type '{}' is defined more than once", type_name)
            }
            ValidationError::DuplicateRelation {
                type_name,
                relation_name,
            } => write!(
                f,
                "relation '{}' is defined more than once on type '{}'",
                relation_name, type_name
            ),
            ValidationError::DuplicateCondition { condition_name } => {
                write!(f, "condition '{}' is defined more than once", condition_name)
            }
            ValidationError::UndefinedRelation {
                type_name,
                relation_name,
                referenced_relation,
            } => write!(
                f,
                "undefined relation '{}' referenced in {}#{}",
                referenced_relation, type_name, relation_name
            ),
            ValidationError::InvalidTypeConstraint {
                type_name,
                relation_name,
                invalid_type,
            } => write!(
                f,
                "invalid type constraint '{}' in {}#{}",
                invalid_type, type_name, relation_name
            ),
            ValidationError::InvalidTupleset {
                type_name,
                relation_name,
                tupleset,
            } => write!(
                f,
                "tupleset '{}' used in {}#{} must be a direct relation to object types",
                tupleset, type_name, relation_name
            ),
            ValidationError::UndefinedCondition {
                type_name,
                relation_name,
                condition_name,
            } => write!(
                f,
                "undefined condition '{}' referenced in {}#{}",
                condition_name, type_name, relation_name
            ),
            ValidationError::InvalidConditionExpression {
                condition_name,
                error_message,
            } => write!(
                f,
                "invalid CEL expression in condition '{}': {}",
                condition_name, error_message
            ),
            ValidationError::EmptySetOperation {
                type_name,
                relation_name,
            } => write!(
                f,
                "union or intersection in {}#{} has no operands",
                type_name, relation_name
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// Validates a model, collecting every problem found.
pub fn validate_model(model: &AuthorizationModel) -> ValidationResult<()> {
    ModelValidator::new(model).validate(model)
}

/// Model validator
pub struct ModelValidator<'m> {
    /// Type definitions by name
    types: HashMap<&'m str, &'m TypeDefinition>,
    /// All defined conditions in the model
    defined_conditions: HashSet<&'m str>,
}

impl<'m> ModelValidator<'m> {
    /// Create a new validator for the given model
    pub fn new(model: &'m AuthorizationModel) -> Self {
        Self {
            types: model
                .type_definitions
                .iter()
                .map(|td| (td.type_name.as_str(), td))
                .collect(),
            defined_conditions: model.conditions.iter().map(|c| c.name.as_str()).collect(),
        }
    }

    /// Validate the model and return any errors found
    pub fn validate(&self, model: &AuthorizationModel) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if model.type_definitions.is_empty() {
            errors.push(ValidationError::EmptyModel);
            return Err(errors);
        }

        let mut seen_types = HashSet::new();
        for type_def in &model.type_definitions {
            if !seen_types.insert(type_def.type_name.as_str()) {
                errors.push(ValidationError::DuplicateType {
                    type_name: type_def.type_name.clone(),
                });
            }
        }

        let mut seen_conditions = HashSet::new();
        for condition in &model.conditions {
            if !seen_conditions.insert(condition.name.as_str()) {
                errors.push(ValidationError::DuplicateCondition {
                    condition_name: condition.name.clone(),
                });
            }
            if let Err(e) = CelExpression::parse(&condition.expression) {
                errors.push(ValidationError::InvalidConditionExpression {
                    condition_name: condition.name.clone(),
                    error_message: e.to_string(),
                });
            }
        }

        for type_def in &model.type_definitions {
            self.validate_type_definition(type_def, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_type_definition(&self, type_def: &TypeDefinition, errors: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for relation_def in &type_def.relations {
            if !seen.insert(relation_def.name.as_str()) {
                errors.push(ValidationError::DuplicateRelation {
                    type_name: type_def.type_name.clone(),
                    relation_name: relation_def.name.clone(),
                });
            }
            self.validate_userset(type_def, &relation_def.name, &relation_def.rewrite, errors);
        }
    }

    /// Validate type constraints (e.g., [user], [group#member], [user:*], [user with cond])
    fn validate_type_constraints(
        &self,
        type_name: &str,
        relation_name: &str,
        constraints: &[TypeConstraint],
        errors: &mut Vec<ValidationError>,
    ) {
        for constraint in constraints {
            let valid = match &constraint.relation {
                _ if !self.type_exists(&constraint.type_name) => false,
                Some(_) if constraint.wildcard => false,
                Some(relation) => self.relation_exists(&constraint.type_name, relation),
                None => true,
            };
            if !valid {
                errors.push(ValidationError::InvalidTypeConstraint {
                    type_name: type_name.to_string(),
                    relation_name: relation_name.to_string(),
                    invalid_type: constraint.to_string(),
                });
            }

            if let Some(condition_name) = &constraint.condition {
                if !self.defined_conditions.contains(condition_name.as_str()) {
                    errors.push(ValidationError::UndefinedCondition {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        condition_name: condition_name.clone(),
                    });
                }
            }
        }
    }

    fn validate_userset(
        &self,
        type_def: &TypeDefinition,
        relation_name: &str,
        userset: &Userset,
        errors: &mut Vec<ValidationError>,
    ) {
        let type_name = type_def.type_name.as_str();
        let undefined = |referenced: &str| ValidationError::UndefinedRelation {
            type_name: type_name.to_string(),
            relation_name: relation_name.to_string(),
            referenced_relation: referenced.to_string(),
        };

        match userset {
            Userset::Direct { allowed } => {
                self.validate_type_constraints(type_name, relation_name, allowed, errors);
            }
            Userset::ComputedUserset { relation } => {
                if !self.relation_exists(type_name, relation) {
                    errors.push(undefined(relation));
                }
            }
            Userset::TupleToUserset {
                tupleset,
                computed_userset,
            } => {
                let Some(tupleset_def) = type_def.relations.iter().find(|r| &r.name == tupleset)
                else {
                    errors.push(undefined(tupleset));
                    return;
                };
                let Userset::Direct { allowed } = &tupleset_def.rewrite else {
                    errors.push(ValidationError::InvalidTupleset {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        tupleset: tupleset.clone(),
                    });
                    return;
                };
                if allowed.iter().any(|c| c.relation.is_some() || c.wildcard) {
                    errors.push(ValidationError::InvalidTupleset {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        tupleset: tupleset.clone(),
                    });
                    return;
                }
                // The computed relation must exist on at least one parent type.
                if !allowed
                    .iter()
                    .any(|c| self.relation_exists(&c.type_name, computed_userset))
                {
                    errors.push(undefined(computed_userset));
                }
            }
            Userset::Union { children } | Userset::Intersection { children } => {
                if children.is_empty() {
                    errors.push(ValidationError::EmptySetOperation {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                    });
                }
                for child in children {
                    self.validate_userset(type_def, relation_name, child, errors);
                }
            }
            Userset::Exclusion { base, subtract } => {
                self.validate_userset(type_def, relation_name, base, errors);
                self.validate_userset(type_def, relation_name, subtract, errors);
            }
        }
    }

    /// Check if a type exists in the model
    pub fn type_exists(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Check if a relation exists on a type
    pub fn relation_exists(&self, type_name: &str, relation_name: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|td| td.relations.iter().any(|r| r.name == relation_name))
    }
}
