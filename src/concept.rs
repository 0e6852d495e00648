//! Concept model: types and things as one flat tagged enum.
//!
//! A [`Concept`] is whatever the server hands back in an answer. Instead of a
//! class lattice (Concept → Thing → Entity ...) every kind is a variant, and
//! the `as_*` accessors are the safe down-casts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeDBError};

/// A type label, optionally scoped (role types are scoped by their relation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub scope: Option<String>,
    pub name: String,
}

impl Label {
    /// An unscoped label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: None,
            name: name.into(),
        }
    }

    /// A label scoped by `scope`, e.g. `marriage:spouse`.
    pub fn scoped(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            name: name.into(),
        }
    }

    /// Parse `name` or `scope:name`.
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((scope, name)) => Self::scoped(scope, name),
            None => Self::new(text),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}:{}", scope, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Internal identifier of a thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iid(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Value type of an attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Object,
    Boolean,
    Long,
    Double,
    String,
    DateTime,
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Long(_) => ValueType::Long,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::DateTime(_) => ValueType::DateTime,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<i64> {
        match self {
            Self::DateTime(millis) => Some(*millis),
            _ => None,
        }
    }
}

/// Schema-level data shared by entity and relation types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub label: Label,
    pub is_root: bool,
    pub is_abstract: bool,
}

/// An attribute type and its value type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTypeInfo {
    pub label: Label,
    pub is_root: bool,
    pub is_abstract: bool,
    pub value_type: ValueType,
}

/// An entity or relation instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingInfo {
    pub iid: Iid,
    pub type_label: Label,
    pub inferred: bool,
}

/// An attribute instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub iid: Iid,
    pub type_label: Label,
    pub inferred: bool,
    pub value: Value,
}

/// Any concept returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Concept {
    RootThingType,
    EntityType(TypeInfo),
    RelationType(TypeInfo),
    AttributeType(AttributeTypeInfo),
    RoleType(TypeInfo),
    Entity(ThingInfo),
    Relation(ThingInfo),
    Attribute(AttributeInfo),
}

impl Concept {
    /// Name of this concept's kind, used in cast errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::RootThingType => "ThingType",
            Self::EntityType(_) => "EntityType",
            Self::RelationType(_) => "RelationType",
            Self::AttributeType(_) => "AttributeType",
            Self::RoleType(_) => "RoleType",
            Self::Entity(_) => "Entity",
            Self::Relation(_) => "Relation",
            Self::Attribute(_) => "Attribute",
        }
    }

    pub fn is_type(&self) -> bool {
        !self.is_thing()
    }

    pub fn is_thing(&self) -> bool {
        matches!(
            self,
            Self::Entity(_) | Self::Relation(_) | Self::Attribute(_)
        )
    }

    /// Label of a type, or of the type of a thing.
    pub fn label(&self) -> Label {
        match self {
            Self::RootThingType => Label::new("thing"),
            Self::EntityType(info) | Self::RelationType(info) | Self::RoleType(info) => {
                info.label.clone()
            }
            Self::AttributeType(info) => info.label.clone(),
            Self::Entity(info) | Self::Relation(info) => info.type_label.clone(),
            Self::Attribute(info) => info.type_label.clone(),
        }
    }

    /// IID of a thing; `None` for types.
    pub fn iid(&self) -> Option<&Iid> {
        match self {
            Self::Entity(info) | Self::Relation(info) => Some(&info.iid),
            Self::Attribute(info) => Some(&info.iid),
            _ => None,
        }
    }

    fn cast_error(&self, to: &'static str) -> TypeDBError {
        TypeDBError::InvalidConceptCast {
            from: self.kind_name(),
            to,
        }
    }

    pub fn as_entity_type(&self) -> Result<&TypeInfo> {
        match self {
            Self::EntityType(info) => Ok(info),
            other => Err(other.cast_error("EntityType")),
        }
    }

    pub fn as_relation_type(&self) -> Result<&TypeInfo> {
        match self {
            Self::RelationType(info) => Ok(info),
            other => Err(other.cast_error("RelationType")),
        }
    }

    pub fn as_attribute_type(&self) -> Result<&AttributeTypeInfo> {
        match self {
            Self::AttributeType(info) => Ok(info),
            other => Err(other.cast_error("AttributeType")),
        }
    }

    pub fn as_entity(&self) -> Result<&ThingInfo> {
        match self {
            Self::Entity(info) => Ok(info),
            other => Err(other.cast_error("Entity")),
        }
    }

    pub fn as_relation(&self) -> Result<&ThingInfo> {
        match self {
            Self::Relation(info) => Ok(info),
            other => Err(other.cast_error("Relation")),
        }
    }

    pub fn as_attribute(&self) -> Result<&AttributeInfo> {
        match self {
            Self::Attribute(info) => Ok(info),
            other => Err(other.cast_error("Attribute")),
        }
    }
}
