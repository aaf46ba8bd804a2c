//! ListUsers test suite.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use super::mocks::{setup, tuple, MockTupleReader, TestResolver};
use super::{document_model, draft_model, org_model};
use crate::error::DomainError;
use crate::model::{Tuple, User};
use crate::resolver::{CheckRequest, ListUsersRequest, ListUsersResult, QueryContext, UserFilter};

async fn list(
    resolver: &TestResolver,
    ctx: &QueryContext,
    object: &str,
    relation: &str,
    filter: Option<UserFilter>,
) -> ListUsersResult {
    let mut request = ListUsersRequest::new(object, relation);
    if let Some(filter) = filter {
        request = request.with_filter(filter);
    }
    resolver.list_users(&request, ctx).await.unwrap()
}

fn users(values: &[&str]) -> Vec<User> {
    values.iter().map(|v| User::parse(v).unwrap()).collect()
}

#[tokio::test]
async fn test_list_users_direct_assignments() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("user:zoe", "admin", "organization:acme"),
            tuple("user:alice", "admin", "organization:acme"),
            tuple("user:bob", "admin", "organization:globex"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, org_model());

    let result = list(&resolver, &ctx, "organization:acme", "admin", Some(UserFilter::new("user"))).await;
    assert_eq!(result.users, users(&["user:alice", "user:zoe"]));
    assert!(result.excluded_users.is_empty());
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_list_users_through_parent_and_computed_relations() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("organization:acme", "organization", "project:api"),
            tuple("user:alice", "admin", "organization:acme"),
            tuple("user:bob", "member", "organization:acme"),
            tuple("user:carol", "editor", "project:api"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, org_model());

    let result = list(&resolver, &ctx, "project:api", "viewer", None).await;
    assert_eq!(result.users, users(&["user:alice", "user:bob", "user:carol"]));
}

#[tokio::test]
async fn test_list_users_expands_nested_groups_and_filters() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("group:eng#member", "viewer", "document:design"),
            tuple("group:backend#member", "member", "group:eng"),
            tuple("user:dana", "member", "group:backend"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, document_model());

    let all = list(&resolver, &ctx, "document:design", "viewer", None).await;
    assert_eq!(
        all.users,
        users(&["user:dana", "group:backend#member", "group:eng#member"])
    );

    let only_users = list(&resolver, &ctx, "document:design", "viewer", Some(UserFilter::new("user"))).await;
    assert_eq!(only_users.users, users(&["user:dana"]));

    let only_groups = list(
        &resolver,
        &ctx,
        "document:design",
        "viewer",
        Some(UserFilter::with_relation("group", "member")),
    )
    .await;
    assert_eq!(only_groups.users, users(&["group:backend#member", "group:eng#member"]));
}

#[tokio::test]
async fn test_list_users_reports_wildcard_exclusions() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("user:*", "viewer", "document:public"),
            tuple("user:owen", "blocked", "document:public"),
            tuple("group:contractors#member", "blocked", "document:public"),
            tuple("user:carl", "member", "group:contractors"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, document_model());

    let result = list(&resolver, &ctx, "document:public", "viewer", Some(UserFilter::new("user"))).await;
    assert_eq!(result.users, users(&["user:*"]));
    assert_eq!(result.excluded_users, users(&["user:carl", "user:owen"]));
}

#[tokio::test]
async fn test_list_users_intersection() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("user:alice", "approver", "document:plan"),
            tuple("user:alice", "editor", "document:plan"),
            tuple("user:bob", "approver", "document:plan"),
            tuple("user:carol", "editor", "document:plan"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, document_model());

    let result = list(&resolver, &ctx, "document:plan", "approver", None).await;
    assert_eq!(result.users, users(&["user:alice"]));
}

#[tokio::test]
async fn test_list_users_terminates_on_group_cycles() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("group:a#member", "member", "group:b"),
            tuple("group:b#member", "member", "group:a"),
            tuple("user:alice", "member", "group:a"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, document_model());

    let result = list(&resolver, &ctx, "group:b", "member", Some(UserFilter::new("user"))).await;
    assert_eq!(result.users, users(&["user:alice"]));
}

#[tokio::test]
async fn test_list_users_evaluates_conditions() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("user:alice", "editor", "document:plan").with_condition("office_hours", HashMap::new()),
            tuple("user:bob", "editor", "document:plan"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, document_model());

    let morning = ctx.clone().with_context(HashMap::from([("hour".to_string(), json!(10))]));
    let result = list(&resolver, &morning, "document:plan", "editor", None).await;
    assert_eq!(result.users, users(&["user:alice", "user:bob"]));

    let evening = ctx.with_context(HashMap::from([("hour".to_string(), json!(20))]));
    let result = list(&resolver, &evening, "document:plan", "editor", None).await;
    assert_eq!(result.users, users(&["user:bob"]));
}

#[tokio::test]
async fn test_list_users_limit_and_errors() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("user:alice", "admin", "organization:acme"),
            tuple("user:bob", "admin", "organization:acme"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, org_model());

    let request = ListUsersRequest::new("organization:acme", "admin").with_limit(1);
    let result = resolver.list_users(&request, &ctx).await.unwrap();
    assert_eq!(result.users, users(&["user:alice"]));
    assert!(result.truncated);

    let request = ListUsersRequest::new("organization:acme", "admin").with_filter(UserFilter::new("robot"));
    let err = resolver.list_users(&request, &ctx).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput { .. }));

    let request = ListUsersRequest::new("organization:acme", "admin")
        .with_filter(UserFilter::with_relation("organization", "owner"));
    let err = resolver.list_users(&request, &ctx).await.unwrap_err();
    assert!(matches!(err, DomainError::UnknownRelation { .. }));

    let request = ListUsersRequest::new("organization:acme", "owner");
    let err = resolver.list_users(&request, &ctx).await.unwrap_err();
    assert!(matches!(err, DomainError::UnknownRelation { .. }));
}

#[tokio::test]
async fn test_list_users_resolves_exclusion_that_subtracts_itself() {
    let tuples = Arc::new(MockTupleReader::new());
    tuples
        .add_all(vec![
            tuple("user:alice", "writer", "draft:d1"),
            tuple("user:bob", "writer", "draft:d1"),
            tuple("user:bob", "reviewer", "draft:d1"),
        ])
        .await;
    let (resolver, ctx) = setup(tuples, draft_model());

    let writers = list(&resolver, &ctx, "draft:d1", "writer", None).await;
    assert_eq!(writers.users, users(&["user:alice"]));
    let reviewers = list(&resolver, &ctx, "draft:d1", "reviewer", None).await;
    assert_eq!(reviewers.users, users(&["user:alice", "user:bob"]));
}

#[tokio::test]
async fn test_list_users_deadline_exceeded_is_an_error() {
    let tuples = Arc::new(MockTupleReader::with_read_delay(Duration::from_millis(200)));
    tuples.add(tuple("user:alice", "admin", "organization:acme")).await;
    let (resolver, ctx) = setup(tuples, org_model());

    let ctx = ctx.with_timeout(Duration::from_millis(20));
    let request = ListUsersRequest::new("organization:acme", "admin");
    let err = resolver.list_users(&request, &ctx).await.unwrap_err();
    assert!(matches!(err, DomainError::DeadlineExceeded), "{err:?}");
}

// ========== Agreement with Check ==========

fn tuple_universe() -> Vec<Tuple> {
    let mut universe = vec![
        tuple("user:alice", "member", "group:g1"),
        tuple("user:bob", "member", "group:g2"),
        tuple("group:g1#member", "member", "group:g2"),
        tuple("group:g2#member", "member", "group:g1"),
    ];
    for user in ["user:alice", "user:bob", "user:*", "group:g1#member"] {
        universe.push(tuple(user, "viewer", "document:d1"));
    }
    for user in ["user:alice", "user:carol", "group:g2#member"] {
        universe.push(tuple(user, "blocked", "document:d1"));
    }
    for user in ["user:alice", "user:bob", "user:carol"] {
        for relation in ["owner", "editor", "approver"] {
            universe.push(tuple(user, relation, "document:d1"));
        }
    }
    universe
}

fn draft_universe() -> Vec<Tuple> {
    let mut universe = Vec::new();
    for user in ["user:alice", "user:bob", "user:*"] {
        universe.push(tuple(user, "writer", "draft:d1"));
    }
    for user in ["user:alice", "user:carol"] {
        universe.push(tuple(user, "reviewer", "draft:d1"));
    }
    universe
}

fn holds(result: &ListUsersResult, user: &User) -> bool {
    result.users.contains(user)
        || (result.users.contains(&User::wildcard(user.user_type()))
            && !result.excluded_users.contains(user))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_list_users_agrees_with_check(
        written in prop::sample::subsequence(tuple_universe(), 0..=tuple_universe().len())
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let tuples = Arc::new(MockTupleReader::new());
            tuples.add_all(written).await;
            let (resolver, ctx) = setup(tuples, document_model());

            for relation in ["viewer", "approver", "editor", "blocked"] {
                let listed = list(&resolver, &ctx, "document:d1", relation, Some(UserFilter::new("user"))).await;
                for user in ["user:alice", "user:bob", "user:carol", "user:dave"] {
                    let allowed = resolver
                        .check(&CheckRequest::new(user, relation, "document:d1"), &ctx)
                        .await
                        .unwrap()
                        .allowed;
                    let user = User::parse(user).unwrap();
                    prop_assert_eq!(holds(&listed, &user), allowed, "{} {}", user, relation);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_list_users_agrees_with_check_on_self_subtracting_exclusion(
        written in prop::sample::subsequence(draft_universe(), 0..=draft_universe().len())
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let tuples = Arc::new(MockTupleReader::new());
            tuples.add_all(written).await;
            let (resolver, ctx) = setup(tuples, draft_model());

            for relation in ["writer", "reviewer"] {
                let listed = list(&resolver, &ctx, "draft:d1", relation, Some(UserFilter::new("user"))).await;
                for user in ["user:alice", "user:bob", "user:carol", "user:dave"] {
                    let allowed = resolver
                        .check(&CheckRequest::new(user, relation, "draft:d1"), &ctx)
                        .await
                        .unwrap()
                        .allowed;
                    let user = User::parse(user).unwrap();
                    prop_assert_eq!(holds(&listed, &user), allowed, "{} {}", user, relation);
                }
            }
            Ok(())
        })?;
    }
}
