//! ListUsers: every user holding a relation on an object.

use std::collections::BTreeSet;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{Object, User, Userset};

use super::context::{QueryScope, TraversalContext};
use super::graph_resolver::{parse_object, BoxFuture, GraphResolver};
use super::traits::{ModelReader, TupleReader};
use super::types::{ListUsersRequest, ListUsersResult, QueryContext};

impl<T, M> GraphResolver<T, M>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    /// Lists the users holding `request.relation` on `request.object`.
    ///
    /// The result contains concrete users, usersets and wildcards. When a
    /// wildcard is returned, `excluded_users` names the users of that type an
    /// exclusion carved out of it. Results are filtered by the request's user
    /// filters, sorted and capped.
    pub async fn list_users(
        &self,
        request: &ListUsersRequest,
        ctx: &QueryContext,
    ) -> DomainResult<ListUsersResult> {
        self.run_with_deadline(ctx, async {
            let scope = self.scope(ctx).await?;
            let object = parse_object(&request.object)?;
            scope.types.get_relation(&object.object_type, &request.relation)?;
            for filter in &request.user_filters {
                if !scope.types.has_type(&filter.type_name) {
                    return Err(DomainError::invalid_input(format!(
                        "user filter type '{}' is not defined",
                        filter.type_name
                    )));
                }
                if let Some(relation) = &filter.relation {
                    scope.types.get_relation(&filter.type_name, relation)?;
                }
            }

            debug!(object = %object, relation = %request.relation, "Listing users");
            let found = self
                .list_relation(
                    &scope,
                    object,
                    request.relation.clone(),
                    TraversalContext::new(),
                )
                .await?;

            let admitted = |user: &User| {
                request.user_filters.is_empty()
                    || request.user_filters.iter().any(|f| f.matches(user))
            };
            let users: Vec<User> = found.users.into_iter().filter(|u| admitted(u)).collect();
            let excluded_users: Vec<User> =
                found.excluded.into_iter().filter(|u| admitted(u)).collect();

            let limit = request.limit.unwrap_or(self.config.list_users_max_results);
            let truncated = users.len() > limit;
            if truncated {
                warn!(
                    object = %request.object,
                    relation = %request.relation,
                    total = users.len(),
                    limit,
                    "ListUsers results truncated"
                );
            }
            Ok(ListUsersResult {
                users: users.into_iter().take(limit).collect(),
                excluded_users,
                truncated,
            })
        })
        .await
    }

    fn list_relation<'a>(
        &'a self,
        scope: &'a QueryScope,
        object: Object,
        relation: String,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<UserSet>> {
        Box::pin(async move {
            let key = format!("{object}#{relation}");
            if ctx.has_visited(&key) {
                return Ok(UserSet::default());
            }
            scope.check_depth(ctx.depth)?;

            let rewrite = scope.types.get_rewrite(&object.object_type, &relation)?;
            let ctx = ctx.with_visited(&key);
            self.list_rewrite(scope, &object, &relation, rewrite, ctx)
                .await
        })
    }

    fn list_rewrite<'a>(
        &'a self,
        scope: &'a QueryScope,
        object: &'a Object,
        relation: &'a str,
        rewrite: &'a Userset,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<UserSet>> {
        Box::pin(async move {
            match rewrite {
                Userset::Direct { allowed } => {
                    let mut found = UserSet::default();
                    let mut nested = Vec::new();
                    for tuple in self.read_relation(scope, object, relation).await? {
                        let condition = tuple.condition.as_ref().map(|c| c.name.as_str());
                        if !allowed.iter().any(|c| c.admits(&tuple.user, condition))
                            || !scope.tuple_applies(&tuple)?
                        {
                            continue;
                        }
                        if let User::Userset {
                            object: set_object,
                            relation: set_relation,
                        } = &tuple.user
                        {
                            nested.push(self.list_relation(
                                scope,
                                set_object.clone(),
                                set_relation.clone(),
                                ctx.increment_depth(),
                            ));
                        }
                        found.users.insert(tuple.user);
                    }
                    for members in join_all(nested).await {
                        found = found.union(&members?);
                    }
                    Ok(found)
                }

                Userset::ComputedUserset { relation: computed } => {
                    self.list_relation(scope, object.clone(), computed.clone(), ctx.increment_depth())
                        .await
                }

                Userset::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    let mut parents = Vec::new();
                    for tuple in self.read_relation(scope, object, tupleset).await? {
                        let User::Object(parent) = &tuple.user else {
                            continue;
                        };
                        if scope.types.has_relation(&parent.object_type, computed_userset)
                            && scope.tuple_applies(&tuple)?
                        {
                            parents.push(self.list_relation(
                                scope,
                                parent.clone(),
                                computed_userset.clone(),
                                ctx.increment_depth(),
                            ));
                        }
                    }
                    let mut found = UserSet::default();
                    for members in join_all(parents).await {
                        found = found.union(&members?);
                    }
                    Ok(found)
                }

                Userset::Union { children } => {
                    let mut found = UserSet::default();
                    for members in self.list_children(scope, object, relation, children, &ctx).await {
                        found = found.union(&members?);
                    }
                    Ok(found)
                }

                Userset::Intersection { children } => {
                    let mut found: Option<UserSet> = None;
                    for members in self.list_children(scope, object, relation, children, &ctx).await {
                        let members = members?;
                        found = Some(match found {
                            None => members,
                            Some(acc) => acc.intersection(&members),
                        });
                    }
                    Ok(found.unwrap_or_default())
                }

                Userset::Exclusion { base, subtract } => {
                    let (base, subtract) = futures::future::join(
                        self.list_rewrite(scope, object, relation, base, ctx.clone()),
                        self.list_rewrite(scope, object, relation, subtract, ctx),
                    )
                    .await;
                    Ok(base?.difference(&subtract?))
                }
            }
        })
    }

    /// Lists each child concurrently, keeping results in child order.
    async fn list_children(
        &self,
        scope: &QueryScope,
        object: &Object,
        relation: &str,
        children: &[Userset],
        ctx: &TraversalContext,
    ) -> Vec<DomainResult<UserSet>> {
        join_all(
            children
                .iter()
                .map(|child| self.list_rewrite(scope, object, relation, child, ctx.clone())),
        )
        .await
    }
}

/// A set of users that may contain type wildcards.
///
/// `user:*` in `users` stands for every user of that type except the ones
/// listed in `excluded`. Entries of `excluded` always belong to a type whose
/// wildcard is in `users`, and never appear in `users` themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UserSet {
    pub(crate) users: BTreeSet<User>,
    pub(crate) excluded: BTreeSet<User>,
}

impl UserSet {
    pub(crate) fn contains(&self, user: &User) -> bool {
        if self.users.contains(user) {
            return true;
        }
        match user {
            User::Object(object) => {
                self.users.contains(&User::wildcard(&object.object_type))
                    && !self.excluded.contains(user)
            }
            User::Userset { .. } | User::Wildcard { .. } => false,
        }
    }

    pub(crate) fn union(&self, other: &UserSet) -> UserSet {
        let users = self.users.union(&other.users).cloned().collect();
        let excluded = self
            .excluded
            .union(&other.excluded)
            .filter(|u| !self.contains(u) && !other.contains(u))
            .cloned()
            .collect();
        UserSet { users, excluded }
    }

    pub(crate) fn intersection(&self, other: &UserSet) -> UserSet {
        let users: BTreeSet<User> = self
            .users
            .union(&other.users)
            .filter(|u| match u {
                User::Wildcard { .. } => self.users.contains(u) && other.users.contains(u),
                _ => self.contains(u) && other.contains(u),
            })
            .cloned()
            .collect();
        let excluded = self
            .excluded
            .union(&other.excluded)
            .filter(|u| users.contains(&User::wildcard(u.user_type())) && !users.contains(u))
            .cloned()
            .collect();
        UserSet { users, excluded }
    }

    /// Users in `self` that are not in `other`.
    pub(crate) fn difference(&self, other: &UserSet) -> UserSet {
        let mut users = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        for user in &self.users {
            match user {
                User::Wildcard { user_type } if other.users.contains(user) => {
                    // Only the users `other` carved out of its wildcard survive.
                    users.extend(
                        other
                            .excluded
                            .iter()
                            .filter(|u| u.user_type() == user_type && self.contains(u))
                            .cloned(),
                    );
                }
                User::Wildcard { user_type } => {
                    users.insert(user.clone());
                    excluded.extend(
                        self.excluded
                            .iter()
                            .chain(other.users.iter().filter(|u| matches!(u, User::Object(_))))
                            .filter(|u| u.user_type() == user_type)
                            .cloned(),
                    );
                }
                _ => {
                    if !other.contains(user) {
                        users.insert(user.clone());
                    }
                }
            }
        }
        excluded.retain(|u| !users.contains(u));
        UserSet { users, excluded }
    }
}
