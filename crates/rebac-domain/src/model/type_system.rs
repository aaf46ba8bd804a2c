//! Type system for authorization model lookups.
//!
//! A `TypeSystem` is built once per model, after validation, and is then
//! shared read-only through `Arc` by every query that names the model.

use std::collections::HashMap;

use crate::cel::CelExpression;
use crate::error::{DomainError, DomainResult};
use crate::validation::validate_model;

use super::types::{
    AuthorizationModel, Condition, RelationDefinition, TypeConstraint, Tuple, Userset,
};

/// A model condition with its compiled expression.
#[derive(Debug)]
pub struct CompiledCondition {
    pub definition: Condition,
    pub expression: CelExpression,
}

/// Indexed, validated view of one authorization model.
///
/// # Example
///
/// ```ignore
/// let types = TypeSystem::new("01HXYZ...", model)?;
/// let viewer = types.get_relation("document", "viewer")?;
/// ```
#[derive(Debug)]
pub struct TypeSystem {
    id: String,
    model: AuthorizationModel,
    /// type name -> relation name -> definition
    relations: HashMap<String, HashMap<String, RelationDefinition>>,
    /// "type#relation" -> user types allowed by any direct clause of the relation
    direct_types: HashMap<String, Vec<TypeConstraint>>,
    conditions: HashMap<String, CompiledCondition>,
}

impl TypeSystem {
    /// Validates `model` and builds its lookup tables.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationError` listing every problem found.
    pub fn new(id: impl Into<String>, model: AuthorizationModel) -> DomainResult<Self> {
        validate_model(&model).map_err(|errors| DomainError::ValidationError { errors })?;

        let mut relations: HashMap<String, HashMap<String, RelationDefinition>> = HashMap::new();
        let mut direct_types = HashMap::new();
        for type_def in &model.type_definitions {
            let by_name = relations.entry(type_def.type_name.clone()).or_default();
            for relation in &type_def.relations {
                let mut allowed = Vec::new();
                collect_direct_constraints(&relation.rewrite, &mut allowed);
                direct_types.insert(format!("{}#{}", type_def.type_name, relation.name), allowed);
                by_name.insert(relation.name.clone(), relation.clone());
            }
        }

        let mut conditions = HashMap::new();
        for condition in &model.conditions {
            let expression =
                CelExpression::parse(&condition.expression).map_err(|e| {
                    DomainError::ConditionError {
                        condition: condition.name.clone(),
                        message: e.to_string(),
                    }
                })?;
            conditions.insert(
                condition.name.clone(),
                CompiledCondition {
                    definition: condition.clone(),
                    expression,
                },
            );
        }

        Ok(Self {
            id: id.into(),
            model,
            relations,
            direct_types,
            conditions,
        })
    }

    /// The model identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a reference to the underlying authorization model.
    pub fn model(&self) -> &AuthorizationModel {
        &self.model
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.relations.contains_key(type_name)
    }

    pub fn has_relation(&self, type_name: &str, relation: &str) -> bool {
        self.relations
            .get(type_name)
            .is_some_and(|r| r.contains_key(relation))
    }

    /// Gets a relation definition for a specific type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownRelation` if the type or the relation does not exist.
    pub fn get_relation(&self, type_name: &str, relation: &str) -> DomainResult<&RelationDefinition> {
        self.relations
            .get(type_name)
            .and_then(|r| r.get(relation))
            .ok_or_else(|| DomainError::unknown_relation(type_name, relation))
    }

    /// Gets the rewrite of a relation.
    pub fn get_rewrite(&self, type_name: &str, relation: &str) -> DomainResult<&Userset> {
        self.get_relation(type_name, relation).map(|r| &r.rewrite)
    }

    /// User types that may be written directly to `type_name#relation`.
    pub fn directly_related_types(&self, type_name: &str, relation: &str) -> &[TypeConstraint] {
        self.direct_types
            .get(&format!("{type_name}#{relation}"))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn condition(&self, name: &str) -> Option<&CompiledCondition> {
        self.conditions.get(name)
    }

    /// Checks a tuple about to be written against the model.
    ///
    /// # Errors
    ///
    /// - `UnknownRelation` if the object type or relation is not defined
    /// - `ConditionError` if the tuple references an undefined condition
    /// - `TypeMismatch` if no direct clause of the relation admits the user
    pub fn validate_tuple(&self, tuple: &Tuple) -> DomainResult<()> {
        self.get_relation(&tuple.object.object_type, &tuple.relation)?;

        let condition = tuple.condition.as_ref().map(|c| c.name.as_str());
        if let Some(name) = condition {
            if self.condition(name).is_none() {
                return Err(DomainError::ConditionError {
                    condition: name.to_string(),
                    message: "condition is not defined in the model".to_string(),
                });
            }
        }

        let allowed = self.directly_related_types(&tuple.object.object_type, &tuple.relation);
        if allowed.iter().any(|c| c.admits(&tuple.user, condition)) {
            return Ok(());
        }

        let expected = if allowed.is_empty() {
            "no directly assignable types".to_string()
        } else {
            allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        Err(DomainError::TypeMismatch {
            message: format!(
                "user '{}' is not allowed on {}#{} (allowed: {})",
                tuple.user, tuple.object.object_type, tuple.relation, expected
            ),
        })
    }
}

fn collect_direct_constraints(userset: &Userset, out: &mut Vec<TypeConstraint>) {
    match userset {
        Userset::Direct { allowed } => {
            for constraint in allowed {
                if !out.contains(constraint) {
                    out.push(constraint.clone());
                }
            }
        }
        Userset::ComputedUserset { .. } | Userset::TupleToUserset { .. } => {}
        Userset::Union { children } | Userset::Intersection { children } => {
            for child in children {
                collect_direct_constraints(child, out);
            }
        }
        Userset::Exclusion { base, subtract } => {
            collect_direct_constraints(base, out);
            collect_direct_constraints(subtract, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Object, TypeDefinition, User};
    use std::collections::HashMap as Map;

    fn document_model() -> AuthorizationModel {
        AuthorizationModel::new("1.1")
            .with_type(TypeDefinition::new("user"))
            .with_type(TypeDefinition::new("group").with_relation(
                "member",
                Userset::direct(vec![TypeConstraint::new("user")]),
            ))
            .with_type(
                TypeDefinition::new("document")
                    .with_relation(
                        "editor",
                        Userset::direct(vec![
                            TypeConstraint::new("user"),
                            TypeConstraint::new("user").with_condition("office_hours"),
                        ]),
                    )
                    .with_relation(
                        "viewer",
                        Userset::union(vec![
                            Userset::direct(vec![
                                TypeConstraint::wildcard("user"),
                                TypeConstraint::userset("group", "member"),
                            ]),
                            Userset::computed("editor"),
                        ]),
                    ),
            )
            .with_condition(Condition::new("office_hours", "hour >= 9 && hour < 17"))
    }

    #[test]
    fn test_lookup_relation() {
        let types = TypeSystem::new("m1", document_model()).unwrap();
        assert_eq!(types.id(), "m1");
        assert!(types.has_type("group"));
        assert!(types.has_relation("document", "viewer"));
        assert!(types.get_relation("document", "viewer").is_ok());
    }

    #[test]
    fn test_unknown_type_and_relation_are_unknown_relation() {
        let types = TypeSystem::new("m1", document_model()).unwrap();
        assert!(matches!(
            types.get_relation("folder", "viewer"),
            Err(DomainError::UnknownRelation { .. })
        ));
        assert!(matches!(
            types.get_relation("document", "owner"),
            Err(DomainError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_invalid_model_is_rejected() {
        let model = AuthorizationModel::new("1.1").with_type(
            TypeDefinition::new("document")
                .with_relation("viewer", Userset::computed("editor")),
        );
        assert!(matches!(
            TypeSystem::new("m1", model),
            Err(DomainError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_directly_related_types_collects_nested_clauses() {
        let types = TypeSystem::new("m1", document_model()).unwrap();
        let allowed = types.directly_related_types("document", "viewer");
        assert_eq!(
            allowed,
            &[
                TypeConstraint::wildcard("user"),
                TypeConstraint::userset("group", "member")
            ]
        );
        assert!(types.directly_related_types("user", "none").is_empty());
    }

    #[test]
    fn test_validate_tuple_accepts_allowed_shapes() {
        let types = TypeSystem::new("m1", document_model()).unwrap();
        let doc = Object::new("document", "plan");

        for (user, relation) in [
            (User::object("user", "alice"), "editor"),
            (User::wildcard("user"), "viewer"),
            (User::userset("group", "eng", "member"), "viewer"),
        ] {
            let tuple = Tuple::new(user, relation, doc.clone());
            assert!(types.validate_tuple(&tuple).is_ok(), "{tuple}");
        }

        let conditional = Tuple::new(User::object("user", "bob"), "editor", doc)
            .with_condition("office_hours", Map::new());
        assert!(types.validate_tuple(&conditional).is_ok());
    }

    #[test]
    fn test_validate_tuple_rejects_disallowed_user_type() {
        let types = TypeSystem::new("m1", document_model()).unwrap();
        let tuple = Tuple::parse("user:alice", "viewer", "document:plan").unwrap();
        assert!(matches!(
            types.validate_tuple(&tuple),
            Err(DomainError::TypeMismatch { .. })
        ));

        let group_as_editor = Tuple::parse("group:eng", "editor", "document:plan").unwrap();
        assert!(matches!(
            types.validate_tuple(&group_as_editor),
            Err(DomainError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_tuple_rejects_unknown_relation_and_condition() {
        let types = TypeSystem::new("m1", document_model()).unwrap();
        let unknown = Tuple::parse("user:alice", "owner", "document:plan").unwrap();
        assert!(matches!(
            types.validate_tuple(&unknown),
            Err(DomainError::UnknownRelation { .. })
        ));

        let bad_condition = Tuple::parse("user:alice", "editor", "document:plan")
            .unwrap()
            .with_condition("weekends", Map::new());
        assert!(matches!(
            types.validate_tuple(&bad_condition),
            Err(DomainError::ConditionError { .. })
        ));
    }
}
