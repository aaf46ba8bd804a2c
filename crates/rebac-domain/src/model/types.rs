//! Core type definitions for the authorization model.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An object identifier (e.g., "document:readme").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Object {
    /// The type portion (e.g., "document").
    pub object_type: String,
    /// The ID portion (e.g., "readme").
    pub object_id: String,
}

impl Object {
    /// Creates a new Object from type and ID.
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    /// Parses an object from "type:id" format.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let (object_type, object_id) = value
            .split_once(':')
            .ok_or("object must be in 'type:id' format")?;
        if object_type.is_empty() || object_id.is_empty() {
            return Err("object type and id cannot be empty");
        }
        if object_id.contains('#') {
            return Err("object id cannot contain '#'");
        }
        Ok(Self::new(object_type, object_id))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// The subject of a relationship.
///
/// Serialized as its string form: `type:id`, `type:id#relation` or `type:*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum User {
    /// A concrete principal (e.g., "user:alice").
    Object(Object),
    /// Everyone holding `relation` on `object` (e.g., "group:eng#member").
    Userset { object: Object, relation: String },
    /// Every principal of a type (e.g., "user:*").
    Wildcard { user_type: String },
}

impl User {
    /// Creates a concrete user.
    pub fn object(user_type: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::Object(Object::new(user_type, user_id))
    }

    /// Creates a userset reference.
    pub fn userset(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self::Userset {
            object: Object::new(object_type, object_id),
            relation: relation.into(),
        }
    }

    /// Creates a type wildcard.
    pub fn wildcard(user_type: impl Into<String>) -> Self {
        Self::Wildcard {
            user_type: user_type.into(),
        }
    }

    /// Parses a user from "type:id", "type:id#relation" or "type:*" format.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        if let Some((object, relation)) = value.split_once('#') {
            if relation.is_empty() {
                return Err("userset relation cannot be empty");
            }
            let object = Object::parse(object)?;
            if object.object_id == "*" {
                return Err("wildcard user cannot carry a relation");
            }
            return Ok(Self::Userset {
                object,
                relation: relation.to_string(),
            });
        }
        let object = Object::parse(value)?;
        if object.object_id == "*" {
            return Ok(Self::Wildcard {
                user_type: object.object_type,
            });
        }
        Ok(Self::Object(object))
    }

    /// The type of this user (for usersets, the type of the referenced object).
    pub fn user_type(&self) -> &str {
        match self {
            User::Object(object) => &object.object_type,
            User::Userset { object, .. } => &object.object_type,
            User::Wildcard { user_type } => user_type,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, User::Wildcard { .. })
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            User::Object(object) => write!(f, "{object}"),
            User::Userset { object, relation } => write!(f, "{object}#{relation}"),
            User::Wildcard { user_type } => write!(f, "{user_type}:*"),
        }
    }
}

impl TryFrom<String> for User {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        User::parse(&value)
    }
}

impl From<User> for String {
    fn from(user: User) -> Self {
        user.to_string()
    }
}

/// A condition reference attached to a tuple, with the parameters bound by
/// the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCondition {
    pub name: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

/// A tuple representing a relationship (user, relation, object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// The user (subject) of the relationship.
    pub user: User,
    /// The relation between user and object.
    pub relation: String,
    /// The object of the relationship.
    pub object: Object,
    /// Optional condition that must hold for the tuple to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RelationshipCondition>,
}

impl Tuple {
    /// Creates a new Tuple without a condition.
    pub fn new(user: User, relation: impl Into<String>, object: Object) -> Self {
        Self {
            user,
            relation: relation.into(),
            object,
            condition: None,
        }
    }

    /// Parses a tuple from its string parts.
    pub fn parse(user: &str, relation: &str, object: &str) -> Result<Self, &'static str> {
        if relation.is_empty() {
            return Err("relation cannot be empty");
        }
        Ok(Self::new(User::parse(user)?, relation, Object::parse(object)?))
    }

    /// Attaches a condition to the tuple.
    pub fn with_condition(
        mut self,
        name: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        self.condition = Some(RelationshipCondition {
            name: name.into(),
            context,
        });
        self
    }

    /// Returns true if both tuples share the natural key (user, relation, object).
    pub fn same_key(&self, other: &Tuple) -> bool {
        self.user == other.user && self.relation == other.relation && self.object == other.object
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.user)
    }
}

/// An authorization model defining types and their relations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationModel {
    /// Schema version (e.g., "1.1").
    pub schema_version: String,
    /// Type definitions in the model.
    pub type_definitions: Vec<TypeDefinition>,
    /// Named conditions tuples may reference.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl AuthorizationModel {
    /// Creates an empty model with the given schema version.
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            type_definitions: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_type(mut self, type_definition: TypeDefinition) -> Self {
        self.type_definitions.push(type_definition);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// A type definition within the authorization model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// The type name (e.g., "document", "folder").
    pub type_name: String,
    /// Relations defined on this type.
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

impl TypeDefinition {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relations: Vec::new(),
        }
    }

    pub fn with_relation(mut self, name: impl Into<String>, rewrite: Userset) -> Self {
        self.relations.push(RelationDefinition {
            name: name.into(),
            rewrite,
        });
        self
    }
}

/// A relation definition on a type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// The relation name.
    pub name: String,
    /// The userset rewrite for this relation.
    pub rewrite: Userset,
}

/// A userset defines how a relation is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Userset {
    /// Direct assignment by tuples whose user matches one of `allowed`.
    Direct { allowed: Vec<TypeConstraint> },
    /// Another relation on the same object.
    ComputedUserset { relation: String },
    /// Follow `tupleset` to a related object, then evaluate `computed_userset` there.
    TupleToUserset {
        tupleset: String,
        computed_userset: String,
    },
    /// Union of multiple usersets.
    Union { children: Vec<Userset> },
    /// Intersection of multiple usersets.
    Intersection { children: Vec<Userset> },
    /// Exclusion (base but not subtract).
    Exclusion {
        base: Box<Userset>,
        subtract: Box<Userset>,
    },
}

impl Userset {
    pub fn direct(allowed: Vec<TypeConstraint>) -> Self {
        Self::Direct { allowed }
    }

    pub fn computed(relation: impl Into<String>) -> Self {
        Self::ComputedUserset {
            relation: relation.into(),
        }
    }

    pub fn tuple_to_userset(tupleset: impl Into<String>, computed_userset: impl Into<String>) -> Self {
        Self::TupleToUserset {
            tupleset: tupleset.into(),
            computed_userset: computed_userset.into(),
        }
    }

    pub fn union(children: Vec<Userset>) -> Self {
        Self::Union { children }
    }

    pub fn intersection(children: Vec<Userset>) -> Self {
        Self::Intersection { children }
    }

    pub fn exclusion(base: Userset, subtract: Userset) -> Self {
        Self::Exclusion {
            base: Box::new(base),
            subtract: Box::new(subtract),
        }
    }
}

/// A user type a direct relation accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeConstraint {
    /// The user type (e.g., "user", "group").
    pub type_name: String,
    /// Userset relation (e.g., "member" for "group#member").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// Accepts `type:*`.
    #[serde(default)]
    pub wildcard: bool,
    /// Condition the tuple must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl TypeConstraint {
    /// Accepts concrete users of a type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
            wildcard: false,
            condition: None,
        }
    }

    /// Accepts usersets `type:id#relation`.
    pub fn userset(type_name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            ..Self::new(type_name)
        }
    }

    /// Accepts the wildcard `type:*`.
    pub fn wildcard(type_name: impl Into<String>) -> Self {
        Self {
            wildcard: true,
            ..Self::new(type_name)
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Returns true if a tuple with this user and condition is admitted.
    pub fn admits(&self, user: &User, condition: Option<&str>) -> bool {
        if self.type_name != user.user_type() || self.condition.as_deref() != condition {
            return false;
        }
        match user {
            User::Object(_) => self.relation.is_none() && !self.wildcard,
            User::Userset { relation, .. } => self.relation.as_deref() == Some(relation.as_str()),
            User::Wildcard { .. } => self.wildcard,
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        if let Some(relation) = &self.relation {
            write!(f, "#{relation}")?;
        }
        if self.wildcard {
            write!(f, ":*")?;
        }
        if let Some(condition) = &self.condition {
            write!(f, " with {condition}")?;
        }
        Ok(())
    }
}

/// Declared type of a condition parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionParamType {
    #[default]
    Any,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Timestamp,
    List,
    Map,
}

/// A named CEL predicate defined on the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    /// CEL source. Parameters are bound as top-level identifiers.
    pub expression: String,
    #[serde(default)]
    pub parameters: HashMap<String, ConditionParamType>,
}

impl Condition {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, param_type: ConditionParamType) -> Self {
        self.parameters.insert(name.into(), param_type);
        self
    }
}
