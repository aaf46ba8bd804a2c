//! ListObjects: every object of a type on which a user holds a relation.
//!
//! Instead of running one check per candidate object, the query is solved
//! bottom-up from the user. Each `(type, relation)` reachable from the
//! requested relation gets a set of object ids, and the sets are recomputed
//! from reverse-index reads until none of them changes.
//!
//! Exclusion is not monotone, so a subtracted relation that depends on the
//! relation being solved cannot take part in the iteration. That subtract is
//! resolved per candidate object through the check path instead, with the
//! solved relation already on the visited path, so the revisit resolves to
//! false exactly as it does in `check`. A relation whose sets are still
//! changing after `max_depth` rounds fails the query with
//! `ResolutionDepthExceeded`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{Object, Tuple, TypeSystem, User, Userset};

use super::context::{QueryScope, TraversalContext};
use super::graph_resolver::{parse_user, visit_key, BoxFuture, GraphResolver};
use super::traits::{ModelReader, TupleReader};
use super::types::{ListObjectsRequest, ListObjectsResult, QueryContext};

/// `(object type, relation)`
type RelationKey = (String, String);

impl<T, M> GraphResolver<T, M>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    /// Lists the objects of `request.object_type` on which the user holds
    /// `request.relation`.
    ///
    /// Agrees with `check` for every object: an object is listed if and only
    /// if the corresponding check would be allowed. Results are sorted and
    /// capped at the request limit, or the configured maximum.
    pub async fn list_objects(
        &self,
        request: &ListObjectsRequest,
        ctx: &QueryContext,
    ) -> DomainResult<ListObjectsResult> {
        self.run_with_deadline(ctx, async {
            let scope = self.scope(ctx).await?;
            let user = parse_user(&request.user)?;
            if user.is_wildcard() {
                return Err(DomainError::invalid_input(format!(
                    "wildcard '{user}' cannot be the user of list objects"
                )));
            }
            scope
                .types
                .get_relation(&request.object_type, &request.relation)?;

            let target = (request.object_type.clone(), request.relation.clone());
            let mut solver = ObjectSolver {
                resolver: self,
                scope: &scope,
                user: &user,
                sets: BTreeMap::new(),
                reverse_cache: HashMap::new(),
            };
            let ids = solver.solve(&target).await?;

            let limit = request.limit.unwrap_or(self.config.list_objects_max_results);
            let truncated = ids.len() > limit;
            if truncated {
                warn!(
                    user = %user,
                    relation = %request.relation,
                    object_type = %request.object_type,
                    total = ids.len(),
                    limit,
                    "ListObjects results truncated"
                );
            }
            let objects = ids
                .into_iter()
                .take(limit)
                .map(|id| format!("{}:{}", request.object_type, id))
                .collect();
            Ok(ListObjectsResult { objects, truncated })
        })
        .await
    }
}

struct ObjectSolver<'a, T, M> {
    resolver: &'a GraphResolver<T, M>,
    scope: &'a QueryScope,
    user: &'a User,
    /// Object ids known to hold each relation for `user`.
    sets: BTreeMap<RelationKey, BTreeSet<String>>,
    /// Reverse reads are stable within a query, so each runs once.
    reverse_cache: HashMap<(String, String, User), Arc<Vec<Tuple>>>,
}

impl<'a, T, M> ObjectSolver<'a, T, M>
where
    T: TupleReader + 'static,
    M: ModelReader + 'static,
{
    async fn solve(&mut self, target: &RelationKey) -> DomainResult<BTreeSet<String>> {
        let scope = self.scope;
        let mut order = reachable_relations(&scope.types, target)?;
        // Dependencies are discovered after their dependents.
        order.reverse();
        for key in &order {
            self.sets.insert(key.clone(), BTreeSet::new());
        }

        let mut rounds = 0u32;
        loop {
            let mut changed = false;
            for key in &order {
                let rewrite = scope.types.get_rewrite(&key.0, &key.1)?;
                let mut next = self.evaluate(&key.0, &key.1, rewrite).await?;
                if let Some(id) = self.seed(key) {
                    next.insert(id);
                }
                if self.sets.get(key) != Some(&next) {
                    self.sets.insert(key.clone(), next);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            rounds += 1;
            if rounds > scope.max_depth {
                return Err(DomainError::ResolutionDepthExceeded {
                    max_depth: scope.max_depth,
                });
            }
        }
        debug!(
            relations = order.len(),
            rounds,
            reverse_reads = self.reverse_cache.len(),
            "ListObjects converged"
        );

        Ok(self.sets.remove(target).unwrap_or_default())
    }

    /// A userset user `g:x#m` is a member of itself.
    fn seed(&self, key: &RelationKey) -> Option<String> {
        match self.user {
            User::Userset { object, relation }
                if object.object_type == key.0 && *relation == key.1 =>
            {
                Some(object.object_id.clone())
            }
            _ => None,
        }
    }

    /// Object ids of `object_type` satisfying `rewrite` under the current sets.
    fn evaluate<'s>(
        &'s mut self,
        object_type: &'s str,
        relation: &'s str,
        rewrite: &'a Userset,
    ) -> BoxFuture<'s, DomainResult<BTreeSet<String>>> {
        Box::pin(async move {
            match rewrite {
                Userset::Direct { allowed } => {
                    let mut candidates = BTreeSet::new();
                    candidates.insert(self.user.clone());
                    if let User::Object(user) = self.user {
                        if allowed
                            .iter()
                            .any(|c| c.wildcard && c.type_name == user.object_type)
                        {
                            candidates.insert(User::wildcard(&user.object_type));
                        }
                    }
                    for constraint in allowed {
                        let Some(member) = &constraint.relation else {
                            continue;
                        };
                        let key = (constraint.type_name.clone(), member.clone());
                        for id in self.sets.get(&key).into_iter().flatten() {
                            candidates.insert(User::userset(&constraint.type_name, id, member));
                        }
                    }

                    let mut ids = BTreeSet::new();
                    for candidate in candidates {
                        let tuples = self.reverse(relation, object_type, candidate).await?;
                        for tuple in tuples.iter() {
                            let condition = tuple.condition.as_ref().map(|c| c.name.as_str());
                            if allowed.iter().any(|c| c.admits(&tuple.user, condition))
                                && self.scope.tuple_applies(tuple)?
                            {
                                ids.insert(tuple.object.object_id.clone());
                            }
                        }
                    }
                    Ok(ids)
                }

                Userset::ComputedUserset { relation: computed } => Ok(self
                    .sets
                    .get(&(object_type.to_string(), computed.clone()))
                    .cloned()
                    .unwrap_or_default()),

                Userset::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    let mut ids = BTreeSet::new();
                    for parent_type in
                        tupleset_parents(&self.scope.types, object_type, tupleset, computed_userset)
                    {
                        let key = (parent_type.clone(), computed_userset.clone());
                        let parents: Vec<String> =
                            self.sets.get(&key).into_iter().flatten().cloned().collect();
                        for parent_id in parents {
                            let parent = User::object(&parent_type, parent_id);
                            let tuples = self.reverse(tupleset, object_type, parent).await?;
                            for tuple in tuples.iter() {
                                if self.scope.tuple_applies(tuple)? {
                                    ids.insert(tuple.object.object_id.clone());
                                }
                            }
                        }
                    }
                    Ok(ids)
                }

                Userset::Union { children } => {
                    let mut ids = BTreeSet::new();
                    for child in children {
                        ids.extend(self.evaluate(object_type, relation, child).await?);
                    }
                    Ok(ids)
                }

                Userset::Intersection { children } => {
                    let mut result: Option<BTreeSet<String>> = None;
                    for child in children {
                        let ids = self.evaluate(object_type, relation, child).await?;
                        result = Some(match result {
                            None => ids,
                            Some(acc) => acc.intersection(&ids).cloned().collect(),
                        });
                        if result.as_ref().is_some_and(BTreeSet::is_empty) {
                            break;
                        }
                    }
                    Ok(result.unwrap_or_default())
                }

                Userset::Exclusion { base, subtract } => {
                    let base = self.evaluate(object_type, relation, base).await?;
                    if base.is_empty() {
                        return Ok(base);
                    }
                    let solving = (object_type.to_string(), relation.to_string());
                    if !depends_on(&self.scope.types, object_type, subtract, &solving)? {
                        let subtract = self.evaluate(object_type, relation, subtract).await?;
                        return Ok(base.difference(&subtract).cloned().collect());
                    }

                    let (resolver, scope, user) = (self.resolver, self.scope, self.user);
                    let mut ids = BTreeSet::new();
                    for id in base {
                        let object = Object::new(object_type, id.as_str());
                        let ctx = TraversalContext::new()
                            .with_visited(&visit_key(user, &object, relation));
                        if !resolver
                            .check_rewrite(scope, user, &object, relation, subtract, ctx)
                            .await?
                        {
                            ids.insert(id);
                        }
                    }
                    Ok(ids)
                }
            }
        })
    }

    async fn reverse(
        &mut self,
        relation: &str,
        object_type: &str,
        user: User,
    ) -> DomainResult<Arc<Vec<Tuple>>> {
        let key = (relation.to_string(), object_type.to_string(), user);
        if let Some(tuples) = self.reverse_cache.get(&key) {
            return Ok(Arc::clone(tuples));
        }
        let tuples = Arc::new(
            self.resolver
                .read_relation_reverse(self.scope, relation, object_type, &key.2)
                .await?,
        );
        self.reverse_cache.insert(key, Arc::clone(&tuples));
        Ok(tuples)
    }
}

/// Every relation the value of `target` can depend on, in discovery order.
fn reachable_relations(types: &TypeSystem, target: &RelationKey) -> DomainResult<Vec<RelationKey>> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([target.clone()]);

    while let Some(key) = queue.pop_front() {
        if !seen.insert(key.clone()) {
            continue;
        }
        let rewrite = types.get_rewrite(&key.0, &key.1)?;
        collect_dependencies(types, &key.0, rewrite, &mut queue);
        order.push(key);
    }
    Ok(order)
}

/// Whether evaluating `rewrite` on `object_type` can read `target`.
fn depends_on(
    types: &TypeSystem,
    object_type: &str,
    rewrite: &Userset,
    target: &RelationKey,
) -> DomainResult<bool> {
    let mut queue = VecDeque::new();
    collect_dependencies(types, object_type, rewrite, &mut queue);
    let mut seen = HashSet::new();
    while let Some(key) = queue.pop_front() {
        if key == *target {
            return Ok(true);
        }
        if !seen.insert(key.clone()) {
            continue;
        }
        let rewrite = types.get_rewrite(&key.0, &key.1)?;
        collect_dependencies(types, &key.0, rewrite, &mut queue);
    }
    Ok(false)
}

fn collect_dependencies(
    types: &TypeSystem,
    object_type: &str,
    rewrite: &Userset,
    out: &mut VecDeque<RelationKey>,
) {
    match rewrite {
        Userset::Direct { allowed } => {
            for constraint in allowed {
                if let Some(member) = &constraint.relation {
                    out.push_back((constraint.type_name.clone(), member.clone()));
                }
            }
        }
        Userset::ComputedUserset { relation } => {
            out.push_back((object_type.to_string(), relation.clone()));
        }
        Userset::TupleToUserset {
            tupleset,
            computed_userset,
        } => {
            for parent_type in tupleset_parents(types, object_type, tupleset, computed_userset) {
                out.push_back((parent_type, computed_userset.clone()));
            }
        }
        Userset::Union { children } | Userset::Intersection { children } => {
            for child in children {
                collect_dependencies(types, object_type, child, out);
            }
        }
        Userset::Exclusion { base, subtract } => {
            collect_dependencies(types, object_type, base, out);
            collect_dependencies(types, object_type, subtract, out);
        }
    }
}

/// Parent types a tupleset may point at that define `computed_userset`.
fn tupleset_parents(
    types: &TypeSystem,
    object_type: &str,
    tupleset: &str,
    computed_userset: &str,
) -> Vec<String> {
    let mut parents: Vec<String> = types
        .directly_related_types(object_type, tupleset)
        .iter()
        .filter(|c| c.relation.is_none() && !c.wildcard)
        .filter(|c| types.has_relation(&c.type_name, computed_userset))
        .map(|c| c.type_name.clone())
        .collect();
    parents.sort();
    parents.dedup();
    parents
}
