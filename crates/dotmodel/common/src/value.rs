// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Tagged property values
//!
//! A property value is either a scalar, a reference to another element, a
//! list of references, or null. The store enforces legality against the
//! metamodel; this type only carries the data and the normalization rules
//! shared by navigation and derivation.

use crate::id::ElementId;
use serde::{Deserialize, Serialize};

/// Upper bound of an association end or attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// At most one value
    One,
    /// Any number of values
    Many,
}

/// Scalar payloads storable in an attribute slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Real(r) => write!(f, "{}", r),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A property value in the object graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value (distinct from "property not found")
    Null,
    /// Scalar payload
    Scalar(ScalarValue),
    /// Reference to a single element
    Reference(ElementId),
    /// Ordered list of element references
    ReferenceList(Vec<ElementId>),
}

impl Value {
    /// Convenience constructor for text scalars
    pub fn text(s: impl Into<String>) -> Self {
        Value::Scalar(ScalarValue::Text(s.into()))
    }

    /// Convenience constructor for boolean scalars
    pub fn bool(b: bool) -> Self {
        Value::Scalar(ScalarValue::Bool(b))
    }

    /// Convenience constructor for integer scalars
    pub fn integer(i: i64) -> Self {
        Value::Scalar(ScalarValue::Integer(i))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The single referenced element, if this value is a reference
    pub fn as_reference(&self) -> Option<ElementId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// The referenced list, if this value is a reference list
    pub fn as_reference_list(&self) -> Option<&[ElementId]> {
        match self {
            Value::ReferenceList(ids) => Some(ids),
            _ => None,
        }
    }

    /// The text payload, if this value is a text scalar
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Scalar(ScalarValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// All element ids carried by this value
    ///
    /// Null and scalars carry none, a reference carries one, a list carries
    /// all of its entries. Used to diff association-end assignments against
    /// the currently-linked id set.
    pub fn reference_ids(&self) -> Vec<ElementId> {
        match self {
            Value::Reference(id) => vec![*id],
            Value::ReferenceList(ids) => ids.clone(),
            Value::Null | Value::Scalar(_) => Vec::new(),
        }
    }

    /// Normalize a set of element ids to the given cardinality
    ///
    /// Bound-one properties report their first id (or null); bound-many
    /// properties always report a list, possibly empty.
    pub fn from_reference_ids(ids: Vec<ElementId>, cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => match ids.first() {
                Some(id) => Value::Reference(*id),
                None => Value::Null,
            },
            Cardinality::Many => Value::ReferenceList(ids),
        }
    }

    /// Render this value for the serialization boundary
    ///
    /// References render as `{"@id": "<uuid>"}` objects rather than embedded
    /// elements; lists render element-wise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Scalar(ScalarValue::Bool(b)) => serde_json::Value::Bool(*b),
            Value::Scalar(ScalarValue::Integer(i)) => serde_json::json!(i),
            Value::Scalar(ScalarValue::Real(r)) => serde_json::json!(r),
            Value::Scalar(ScalarValue::Text(s)) => serde_json::Value::String(s.clone()),
            Value::Reference(id) => serde_json::json!({ "@id": id.to_string() }),
            Value::ReferenceList(ids) => {
                serde_json::Value::Array(ids.iter().map(|id| serde_json::json!({ "@id": id.to_string() })).collect())
            }
        }
    }
}
