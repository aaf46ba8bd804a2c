//! Tests for the graph resolver module.
//!
//! Organized by functionality:
//! - Check and BatchCheck (set algebra, cycles, depth, snapshots, conditions)
//! - Expand
//! - ListObjects
//! - ListUsers


mod list_users_tests;

use crate::model::{
    AuthorizationModel, Condition, ConditionParamType, TypeConstraint, TypeDefinition, Userset,
};

/// Organizations and projects, with membership inherited through the
/// project's organization.
pub(super) fn org_model() -> AuthorizationModel {
    AuthorizationModel::new("1.1")
        .with_type(TypeDefinition::new("user"))
        .with_type(
            TypeDefinition::new("organization")
                .with_relation("admin", Userset::direct(vec![TypeConstraint::new("user")]))
                .with_relation(
                    "member",
                    Userset::union(vec![
                        Userset::direct(vec![TypeConstraint::new("user")]),
                        Userset::computed("admin"),
                    ]),
                ),
        )
        .with_type(
            TypeDefinition::new("project")
                .with_relation(
                    "organization",
                    Userset::direct(vec![TypeConstraint::new("organization")]),
                )
                .with_relation("editor", Userset::direct(vec![TypeConstraint::new("user")]))
                .with_relation(
                    "viewer",
                    Userset::union(vec![
                        Userset::direct(vec![TypeConstraint::new("user")]),
                        Userset::computed("editor"),
                        Userset::tuple_to_userset("organization", "member"),
                    ]),
                ),
        )
}

/// Documents shared with users, groups and everyone, minus a block list.
pub(super) fn document_model() -> AuthorizationModel {
    AuthorizationModel::new("1.1")
        .with_type(TypeDefinition::new("user"))
        .with_type(TypeDefinition::new("group").with_relation(
            "member",
            Userset::direct(vec![
                TypeConstraint::new("user"),
                TypeConstraint::userset("group", "member"),
            ]),
        ))
        .with_type(
            TypeDefinition::new("document")
                .with_relation("owner", Userset::direct(vec![TypeConstraint::new("user")]))
                .with_relation(
                    "blocked",
                    Userset::direct(vec![
                        TypeConstraint::new("user"),
                        TypeConstraint::userset("group", "member"),
                    ]),
                )
                .with_relation(
                    "editor",
                    Userset::direct(vec![
                        TypeConstraint::new("user"),
                        TypeConstraint::new("user").with_condition("office_hours"),
                    ]),
                )
                .with_relation(
                    "viewer",
                    Userset::exclusion(
                        Userset::union(vec![
                            Userset::direct(vec![
                                TypeConstraint::new("user"),
                                TypeConstraint::wildcard("user"),
                                TypeConstraint::userset("group", "member"),
                            ]),
                            Userset::computed("owner"),
                        ]),
                        Userset::computed("blocked"),
                    ),
                )
                .with_relation(
                    "approver",
                    Userset::intersection(vec![
                        Userset::direct(vec![TypeConstraint::new("user")]),
                        Userset::computed("editor"),
                    ]),
                ),
        )
        .with_condition(
            Condition::new("office_hours", "hour >= 9 && hour < 17")
                .with_parameter("hour", ConditionParamType::Int),
        )
}

/// Drafts where a writer who is also a reviewer loses write access, and
/// every writer counts as a reviewer. The subtracted relation reads back
/// into the relation it is subtracted from.
pub(super) fn draft_model() -> AuthorizationModel {
    AuthorizationModel::new("1.1")
        .with_type(TypeDefinition::new("user"))
        .with_type(
            TypeDefinition::new("draft")
                .with_relation(
                    "writer",
                    Userset::exclusion(
                        Userset::direct(vec![
                            TypeConstraint::new("user"),
                            TypeConstraint::wildcard("user"),
                        ]),
                        Userset::computed("reviewer"),
                    ),
                )
                .with_relation(
                    "reviewer",
                    Userset::union(vec![
                        Userset::direct(vec![TypeConstraint::new("user")]),
                        Userset::computed("writer"),
                    ]),
                ),
        )
}
