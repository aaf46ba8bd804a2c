//! Graph resolver for permission checks.
//!
//! The resolver performs async graph traversal to determine if a user has a
//! specific relation to an object, and expands relations into trees.
//!
//! # Architecture Decisions
//!
//! - **Parallel Execution**: Union, intersection, userset and tuple-to-userset
//!   fan-outs use `FuturesUnordered` with short-circuiting. Outcomes do not
//!   depend on completion order: a union is true if any branch proved true,
//!   otherwise it fails with the error of the lowest-indexed failing branch,
//!   otherwise it is false. Intersection mirrors this with false.
//!
//! - **Cycle Detection**: Tracks `(user, relation, object)` along the current
//!   path. Revisiting a node resolves it to false rather than failing.
//!
//! - **Depth Limiting**: Default max depth of 25 matches OpenFGA behavior.
//!   Every nested relation evaluation consumes one unit; running out fails
//!   the query with `ResolutionDepthExceeded`.
//!
//! - **Snapshot**: The snapshot token is captured once per query so every
//!   read observes the same state.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, FuturesUnordered, StreamExt, TryStreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{Object, Tuple, TypeConstraint, User, Userset};

use super::config::ResolverConfig;
use super::context::{QueryScope, TraversalContext};
use super::traits::{ModelReader, TupleReader};
use super::types::{
    BatchCheckItem, BatchCheckResult, CheckRequest, CheckResult, ExpandLeaf, ExpandLeafValue,
    ExpandNode, ExpandRequest, ExpandResult, QueryContext, UsersetTree,
};

/// Type alias for boxed future to handle async recursion.
pub(super) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Graph resolver for permission checks.
///
/// Generic over the tuple and model sources so the same engine runs on top
/// of any store that can serve snapshot reads and reverse lookups.
pub struct GraphResolver<T, M> {
    pub(super) tuple_reader: Arc<T>,
    pub(super) model_reader: Arc<M>,
    pub(super) config: ResolverConfig,
}

impl<T, M> GraphResolver<T, M>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    /// Creates a new graph resolver.
    pub fn new(tuple_reader: Arc<T>, model_reader: Arc<M>) -> Self {
        Self::with_config(tuple_reader, model_reader, ResolverConfig::default())
    }

    /// Creates a new graph resolver with custom configuration.
    pub fn with_config(tuple_reader: Arc<T>, model_reader: Arc<M>, config: ResolverConfig) -> Self {
        Self {
            tuple_reader,
            model_reader,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Performs a permission check.
    ///
    /// # Errors
    ///
    /// `ModelNotFound`, `UnknownRelation`, `InvalidInput`,
    /// `ResolutionDepthExceeded`, `DeadlineExceeded`, `ConditionError` or
    /// `Storage`. An error is never reported as a denial.
    pub async fn check(&self, request: &CheckRequest, ctx: &QueryContext) -> DomainResult<CheckResult> {
        self.run_with_deadline(ctx, async {
            let scope = self.scope(ctx).await?;
            self.check_in_scope(&scope, request).await
        })
        .await
    }

    /// Evaluates many checks against one snapshot with bounded concurrency.
    ///
    /// Individual failures are reported per item; the call itself only fails
    /// when the batch is malformed or the shared setup fails.
    pub async fn batch_check(
        &self,
        items: Vec<BatchCheckItem>,
        ctx: &QueryContext,
    ) -> DomainResult<BatchCheckResult> {
        let mut seen = HashSet::new();
        for item in &items {
            if item.correlation_id.is_empty() || !seen.insert(item.correlation_id.as_str()) {
                return Err(DomainError::invalid_input(format!(
                    "correlation ids must be unique and non-empty: '{}'",
                    item.correlation_id
                )));
            }
        }

        self.run_with_deadline(ctx, async {
            let scope = self.scope(ctx).await?;
            let scope = &scope;
            let results: HashMap<_, _> = stream::iter(items)
                .map(|item| async move {
                    let result = self.check_in_scope(scope, &item.request).await;
                    (item.correlation_id, result)
                })
                .buffer_unordered(self.config.max_concurrent_checks.max(1))
                .collect()
                .await;
            Ok(BatchCheckResult { results })
        })
        .await
    }

    /// Expands a relation on an object into a tree mirroring its rewrite.
    ///
    /// Every branch is resolved one level deep: direct leaves list the users
    /// written to the relation, computed usersets are references, and
    /// tuple-to-userset leaves list the `parent#relation` usersets reached.
    pub async fn expand(&self, request: &ExpandRequest, ctx: &QueryContext) -> DomainResult<ExpandResult> {
        self.run_with_deadline(ctx, async {
            let scope = self.scope(ctx).await?;
            let object = parse_object(&request.object)?;
            let rewrite = scope.types.get_rewrite(&object.object_type, &request.relation)?;
            debug!(object = %object, relation = %request.relation, "Expanding relation");

            let root = self
                .expand_rewrite(&scope, &object, &request.relation, rewrite, 0)
                .await?;
            Ok(ExpandResult {
                tree: UsersetTree { root },
            })
        })
        .await
    }

    /// Runs `fut` under the caller's deadline or the configured timeout.
    pub(super) async fn run_with_deadline<F, R>(&self, ctx: &QueryContext, fut: F) -> DomainResult<R>
    where
        F: Future<Output = DomainResult<R>>,
    {
        let deadline = ctx
            .deadline
            .unwrap_or_else(|| Instant::now() + self.config.timeout);
        match timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model_id = %ctx.authorization_model_id, "Query deadline exceeded");
                Err(DomainError::DeadlineExceeded)
            }
        }
    }

    /// Resolves the model and snapshot for one query.
    pub(super) async fn scope(&self, ctx: &QueryContext) -> DomainResult<QueryScope> {
        let types = self.model_reader.get_model(&ctx.authorization_model_id).await?;
        for tuple in ctx.contextual_tuples.iter() {
            types.validate_tuple(tuple)?;
        }
        let snapshot = match ctx.snapshot {
            Some(snapshot) => snapshot,
            None => self.tuple_reader.snapshot().await?,
        };
        Ok(QueryScope {
            types,
            snapshot,
            contextual_tuples: Arc::clone(&ctx.contextual_tuples),
            context: Arc::clone(&ctx.context),
            max_depth: ctx.max_depth.unwrap_or(self.config.max_depth),
        })
    }

    async fn check_in_scope(&self, scope: &QueryScope, request: &CheckRequest) -> DomainResult<CheckResult> {
        let user = parse_user(&request.user)?;
        if user.is_wildcard() {
            return Err(DomainError::invalid_input(format!(
                "wildcard '{user}' cannot be the user of a check"
            )));
        }
        let object = parse_object(&request.object)?;
        scope.types.get_relation(&object.object_type, &request.relation)?;

        debug!(
            user = %user,
            relation = %request.relation,
            object = %object,
            snapshot = %scope.snapshot,
            "Checking relation"
        );
        let allowed = self
            .check_relation(
                scope,
                &user,
                object,
                request.relation.clone(),
                TraversalContext::new(),
            )
            .await?;
        Ok(CheckResult { allowed })
    }

    /// Evaluates `user` against `relation` on `object`.
    pub(super) fn check_relation<'a>(
        &'a self,
        scope: &'a QueryScope,
        user: &'a User,
        object: Object,
        relation: String,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            let key = visit_key(user, &object, &relation);
            if ctx.has_visited(&key) {
                return Ok(false);
            }
            scope.check_depth(ctx.depth)?;

            // A userset is trivially a member of itself.
            if let User::Userset {
                object: set_object,
                relation: set_relation,
            } = user
            {
                if *set_object == object && *set_relation == relation {
                    return Ok(true);
                }
            }

            let rewrite = scope.types.get_rewrite(&object.object_type, &relation)?;
            let ctx = ctx.with_visited(&key);
            self.check_rewrite(scope, user, &object, &relation, rewrite, ctx)
                .await
        })
    }

    /// Resolves a userset rewrite (boxed for recursion).
    pub(super) fn check_rewrite<'a>(
        &'a self,
        scope: &'a QueryScope,
        user: &'a User,
        object: &'a Object,
        relation: &'a str,
        rewrite: &'a Userset,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            match rewrite {
                Userset::Direct { allowed } => {
                    self.check_direct(scope, user, object, relation, allowed, ctx)
                        .await
                }

                Userset::ComputedUserset { relation: computed } => {
                    self.check_relation(
                        scope,
                        user,
                        object.clone(),
                        computed.clone(),
                        ctx.increment_depth(),
                    )
                    .await
                }

                Userset::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    self.check_tuple_to_userset(scope, user, object, tupleset, computed_userset, ctx)
                        .await
                }

                Userset::Union { children } => {
                    let branches = children
                        .iter()
                        .map(|child| self.check_rewrite(scope, user, object, relation, child, ctx.clone()))
                        .collect();
                    any_true(branches).await
                }

                Userset::Intersection { children } => {
                    let branches = children
                        .iter()
                        .map(|child| self.check_rewrite(scope, user, object, relation, child, ctx.clone()))
                        .collect();
                    all_true(branches).await
                }

                Userset::Exclusion { base, subtract } => {
                    // Both sides always run to completion.
                    let (base, subtract) = futures::future::join(
                        self.check_rewrite(scope, user, object, relation, base, ctx.clone()),
                        self.check_rewrite(scope, user, object, relation, subtract, ctx),
                    )
                    .await;
                    match (base, subtract) {
                        (Ok(false), _) | (_, Ok(true)) => Ok(false),
                        (Ok(true), Ok(false)) => Ok(true),
                        (Err(e), _) | (_, Err(e)) => Err(e),
                    }
                }
            }
        })
    }

    /// Resolves a direct tuple assignment.
    ///
    /// Tuples whose user shape is not admitted by `allowed` are ignored.
    async fn check_direct(
        &self,
        scope: &QueryScope,
        user: &User,
        object: &Object,
        relation: &str,
        allowed: &[TypeConstraint],
        ctx: TraversalContext,
    ) -> DomainResult<bool> {
        let tuples = self.read_relation(scope, object, relation).await?;

        let mut first_error = None;
        let mut usersets = Vec::new();
        for tuple in tuples {
            let condition = tuple.condition.as_ref().map(|c| c.name.as_str());
            if !allowed.iter().any(|c| c.admits(&tuple.user, condition)) {
                continue;
            }

            let direct_match = match (&tuple.user, user) {
                (User::Wildcard { user_type }, User::Object(requested)) => {
                    *user_type == requested.object_type
                }
                (tuple_user, requested) => tuple_user == requested,
            };
            if direct_match {
                match scope.tuple_applies(&tuple) {
                    Ok(true) => return Ok(true),
                    Ok(false) => {}
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            } else if matches!(tuple.user, User::Userset { .. }) {
                usersets.push(tuple);
            }
        }

        let branches: Vec<BoxFuture<'_, DomainResult<bool>>> = usersets
            .into_iter()
            .map(|tuple| {
                let ctx = ctx.increment_depth();
                Box::pin(async move {
                    if !scope.tuple_applies(&tuple)? {
                        return Ok(false);
                    }
                    let User::Userset { object, relation } = tuple.user else {
                        return Ok(false);
                    };
                    self.check_relation(scope, user, object, relation, ctx).await
                }) as BoxFuture<'_, DomainResult<bool>>
            })
            .collect();

        match any_true(branches).await {
            Ok(true) => Ok(true),
            result => match first_error {
                Some(e) => Err(e),
                None => result,
            },
        }
    }

    /// Resolves a tuple-to-userset relation (e.g., viewer from parent).
    async fn check_tuple_to_userset(
        &self,
        scope: &QueryScope,
        user: &User,
        object: &Object,
        tupleset: &str,
        computed_userset: &str,
        ctx: TraversalContext,
    ) -> DomainResult<bool> {
        let tuples = self.read_relation(scope, object, tupleset).await?;

        let branches: Vec<BoxFuture<'_, DomainResult<bool>>> = tuples
            .into_iter()
            .filter(|tuple| match &tuple.user {
                User::Object(parent) => scope.types.has_relation(&parent.object_type, computed_userset),
                _ => false,
            })
            .map(|tuple| {
                let ctx = ctx.increment_depth();
                Box::pin(async move {
                    if !scope.tuple_applies(&tuple)? {
                        return Ok(false);
                    }
                    let User::Object(parent) = tuple.user else {
                        return Ok(false);
                    };
                    self.check_relation(scope, user, parent, computed_userset.to_string(), ctx)
                        .await
                }) as BoxFuture<'_, DomainResult<bool>>
            })
            .collect();

        any_true(branches).await
    }

    /// Recursively expands a userset rewrite into an ExpandNode tree.
    fn expand_rewrite<'a>(
        &'a self,
        scope: &'a QueryScope,
        object: &'a Object,
        relation: &'a str,
        rewrite: &'a Userset,
        depth: u32,
    ) -> BoxFuture<'a, DomainResult<ExpandNode>> {
        Box::pin(async move {
            scope.check_depth(depth)?;
            let name = format!("{object}#{relation}");

            let node = match rewrite {
                Userset::Direct { allowed } => {
                    let mut users: Vec<String> = self
                        .read_relation(scope, object, relation)
                        .await?
                        .into_iter()
                        .filter(|t| {
                            let condition = t.condition.as_ref().map(|c| c.name.as_str());
                            allowed.iter().any(|c| c.admits(&t.user, condition))
                        })
                        .map(|t| t.user.to_string())
                        .collect();
                    users.sort();
                    users.dedup();
                    ExpandNode::Leaf(ExpandLeaf {
                        name,
                        value: ExpandLeafValue::Users(users),
                    })
                }

                Userset::ComputedUserset { relation: computed } => ExpandNode::Leaf(ExpandLeaf {
                    name,
                    value: ExpandLeafValue::Computed {
                        userset: format!("{object}#{computed}"),
                    },
                }),

                Userset::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    let mut computed: Vec<String> = self
                        .read_relation(scope, object, tupleset)
                        .await?
                        .into_iter()
                        .filter_map(|t| match t.user {
                            User::Object(parent)
                                if scope.types.has_relation(&parent.object_type, computed_userset) =>
                            {
                                Some(format!("{parent}#{computed_userset}"))
                            }
                            _ => None,
                        })
                        .collect();
                    computed.sort();
                    computed.dedup();
                    ExpandNode::Leaf(ExpandLeaf {
                        name,
                        value: ExpandLeafValue::TupleToUserset {
                            tupleset: format!("{object}#{tupleset}"),
                            computed,
                        },
                    })
                }

                Userset::Union { children } => ExpandNode::Union {
                    name,
                    nodes: self
                        .expand_children(scope, object, relation, children, depth)
                        .await?,
                },

                Userset::Intersection { children } => ExpandNode::Intersection {
                    name,
                    nodes: self
                        .expand_children(scope, object, relation, children, depth)
                        .await?,
                },

                Userset::Exclusion { base, subtract } => {
                    let (base, subtract) = futures::future::try_join(
                        self.expand_rewrite(scope, object, relation, base, depth + 1),
                        self.expand_rewrite(scope, object, relation, subtract, depth + 1),
                    )
                    .await?;
                    ExpandNode::Difference {
                        name,
                        base: Box::new(base),
                        subtract: Box::new(subtract),
                    }
                }
            };
            Ok(node)
        })
    }

    async fn expand_children(
        &self,
        scope: &QueryScope,
        object: &Object,
        relation: &str,
        children: &[Userset],
        depth: u32,
    ) -> DomainResult<Vec<ExpandNode>> {
        futures::future::try_join_all(
            children
                .iter()
                .map(|child| self.expand_rewrite(scope, object, relation, child, depth + 1)),
        )
        .await
    }

    /// Reads `(*, relation, object)`: contextual tuples first, then stored
    /// tuples not shadowed by a contextual tuple with the same key.
    pub(super) async fn read_relation(
        &self,
        scope: &QueryScope,
        object: &Object,
        relation: &str,
    ) -> DomainResult<Vec<Tuple>> {
        let mut tuples: Vec<Tuple> = scope
            .contextual_tuples
            .iter()
            .filter(|t| t.object == *object && t.relation == relation)
            .cloned()
            .collect();
        let contextual = tuples.len();

        let mut stored = self
            .tuple_reader
            .read_tuples(scope.snapshot, object, relation)
            .await?;
        while let Some(tuple) = stored.try_next().await? {
            if !tuples[..contextual].iter().any(|c| c.same_key(&tuple)) {
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }

    /// Reads `(user, relation, object_type:*)` through the reverse index,
    /// with the same contextual precedence as `read_relation`.
    pub(super) async fn read_relation_reverse(
        &self,
        scope: &QueryScope,
        relation: &str,
        object_type: &str,
        user: &User,
    ) -> DomainResult<Vec<Tuple>> {
        let mut tuples: Vec<Tuple> = scope
            .contextual_tuples
            .iter()
            .filter(|t| {
                t.relation == relation && t.object.object_type == object_type && t.user == *user
            })
            .cloned()
            .collect();
        let contextual = tuples.len();

        let mut stored = self
            .tuple_reader
            .read_reverse(scope.snapshot, relation, object_type, user)
            .await?;
        while let Some(tuple) = stored.try_next().await? {
            if !tuples[..contextual].iter().any(|c| c.same_key(&tuple)) {
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }
}

/// True if any branch is true; otherwise the lowest-indexed error; otherwise false.
async fn any_true(branches: Vec<BoxFuture<'_, DomainResult<bool>>>) -> DomainResult<bool> {
    let mut pending: FuturesUnordered<_> = branches
        .into_iter()
        .enumerate()
        .map(|(index, branch)| async move { (index, branch.await) })
        .collect();

    let mut first_error = None;
    while let Some((index, result)) = pending.next().await {
        match result {
            // Short-circuit: dropping `pending` cancels the remaining branches.
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => keep_lowest(&mut first_error, index, e),
        }
    }
    first_error.map_or(Ok(false), |(_, e)| Err(e))
}

/// False if any branch is false; otherwise the lowest-indexed error; otherwise true.
async fn all_true(branches: Vec<BoxFuture<'_, DomainResult<bool>>>) -> DomainResult<bool> {
    let mut pending: FuturesUnordered<_> = branches
        .into_iter()
        .enumerate()
        .map(|(index, branch)| async move { (index, branch.await) })
        .collect();

    let mut first_error = None;
    while let Some((index, result)) = pending.next().await {
        match result {
            Ok(false) => return Ok(false),
            Ok(true) => {}
            Err(e) => keep_lowest(&mut first_error, index, e),
        }
    }
    first_error.map_or(Ok(true), |(_, e)| Err(e))
}

fn keep_lowest(slot: &mut Option<(usize, DomainError)>, index: usize, error: DomainError) {
    if slot.as_ref().map_or(true, |(lowest, _)| index < *lowest) {
        *slot = Some((index, error));
    }
}

/// Path entry for `user` evaluated against `relation` on `object`.
pub(super) fn visit_key(user: &User, object: &Object, relation: &str) -> String {
    format!("{user}@{object}#{relation}")
}

pub(super) fn parse_object(value: &str) -> DomainResult<Object> {
    Object::parse(value).map_err(|e| DomainError::invalid_input(format!("'{value}': {e}")))
}

pub(super) fn parse_user(value: &str) -> DomainResult<User> {
    User::parse(value).map_err(|e| DomainError::invalid_input(format!("'{value}': {e}")))
}
