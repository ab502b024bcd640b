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

//! Metamodel definitions
//!
//! Schema-level descriptions of element types (classes) and relationship
//! types (associations). Definitions are registered once at startup into
//! the [`MetamodelRegistry`], which precomputes all lookup indices in a
//! single `build_indexes` step and is immutable afterwards.

mod registry;

pub use registry::{ClassAssociationEnd, EndRef, MetamodelRegistry, OwnershipRole};

use dotmodel_common::Cardinality;
use serde::{Deserialize, Serialize};

/// Name of the synthetic base class
///
/// Every class registered without explicit superclasses is given this class
/// as its single superclass at registration time, so that all classes share
/// common default behavior and constraints.
pub const BASE_CLASS: &str = "Base";

/// Language tag whose operation bodies are plain property references
pub const PROPERTY_REF_LANGUAGE: &str = "property";

/// Whether one endpoint of an association structurally owns the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationKind {
    None,
    Shared,
    Composite,
}

/// One side of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndSide {
    Source,
    Target,
}

impl EndSide {
    pub fn opposite(self) -> Self {
        match self {
            EndSide::Source => EndSide::Target,
            EndSide::Target => EndSide::Source,
        }
    }
}

/// A named constraint or derivation expression bound to a language tag
///
/// The engine never interprets the expression text; it is handed to the
/// expression evaluator registered for `language`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConstraint {
    pub name: String,
    pub language: String,
    pub expression: String,
}

impl MetaConstraint {
    pub fn new(name: impl Into<String>, language: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            expression: expression.into(),
        }
    }
}

/// An operation definition on a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaOperation {
    pub name: String,
    /// Body language tag; [`PROPERTY_REF_LANGUAGE`] short-circuits to a
    /// property read, other tags dispatch to a registered evaluator.
    pub language: String,
    pub body: String,
}

impl MetaOperation {
    pub fn new(name: impl Into<String>, language: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            body: body.into(),
        }
    }
}

/// An attribute definition on a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAttribute {
    pub name: String,
    pub value_type: String,
    /// Derived attributes are computed by an evaluator and reject direct
    /// assignment.
    pub derived: bool,
    pub derivation: Option<MetaConstraint>,
    pub is_union: bool,
}

impl MetaAttribute {
    pub fn new(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            derived: false,
            derivation: None,
            is_union: false,
        }
    }

    pub fn derived(name: impl Into<String>, value_type: impl Into<String>, derivation: MetaConstraint) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            derived: true,
            derivation: Some(derivation),
            is_union: false,
        }
    }
}

/// Names of the association-end pair that constitutes ownership
///
/// Declared on a metaclass so that cascade delete and the name index can
/// recognize ownership edges generically, without hardcoding concrete
/// association names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipBinding {
    /// End name on the owner side (owner → intermediate edges)
    pub owner_end: String,
    /// End name on the child side (intermediate → child edges)
    pub child_end: String,
}

/// A class definition in the metamodel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaClass {
    pub name: String,
    pub is_abstract: bool,
    pub superclasses: Vec<String>,
    pub attributes: Vec<MetaAttribute>,
    pub constraints: Vec<MetaConstraint>,
    pub operations: Vec<MetaOperation>,
    pub ownership: Option<OwnershipBinding>,
}

impl MetaClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_abstract: false,
            superclasses: Vec::new(),
            attributes: Vec::new(),
            constraints: Vec::new(),
            operations: Vec::new(),
            ownership: None,
        }
    }

    pub fn abstract_class(name: impl Into<String>) -> Self {
        let mut class = Self::new(name);
        class.is_abstract = true;
        class
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclasses.push(superclass.into());
        self
    }

    pub fn with_attribute(mut self, attribute: MetaAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_constraint(mut self, constraint: MetaConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_operation(mut self, operation: MetaOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_ownership(mut self, owner_end: impl Into<String>, child_end: impl Into<String>) -> Self {
        self.ownership = Some(OwnershipBinding {
            owner_end: owner_end.into(),
            child_end: child_end.into(),
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&MetaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// One end of an association definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationEnd {
    pub name: String,
    pub related_type: String,
    pub navigable: bool,
    pub aggregation: AggregationKind,
    pub derived: bool,
    pub derivation: Option<MetaConstraint>,
    pub cardinality: Cardinality,
    /// Base property names whose values this end's links must also appear
    /// under.
    pub redefines: Vec<String>,
    pub subsets: Vec<String>,
}

impl AssociationEnd {
    pub fn new(name: impl Into<String>, related_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            related_type: related_type.into(),
            navigable: true,
            aggregation: AggregationKind::None,
            derived: false,
            derivation: None,
            cardinality: Cardinality::Many,
            redefines: Vec::new(),
            subsets: Vec::new(),
        }
    }

    pub fn composite(mut self) -> Self {
        self.aggregation = AggregationKind::Composite;
        self
    }

    pub fn shared(mut self) -> Self {
        self.aggregation = AggregationKind::Shared;
        self
    }

    pub fn bound_one(mut self) -> Self {
        self.cardinality = Cardinality::One;
        self
    }

    pub fn non_navigable(mut self) -> Self {
        self.navigable = false;
        self
    }

    pub fn redefining(mut self, base: impl Into<String>) -> Self {
        self.redefines.push(base.into());
        self
    }

    pub fn subsetting(mut self, base: impl Into<String>) -> Self {
        self.subsets.push(base.into());
        self
    }

    pub fn derived_by(mut self, derivation: MetaConstraint) -> Self {
        self.derived = true;
        self.derivation = Some(derivation);
        self
    }
}

/// An association definition in the metamodel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAssociation {
    pub name: String,
    pub source: AssociationEnd,
    pub target: AssociationEnd,
}

impl MetaAssociation {
    pub fn new(name: impl Into<String>, source: AssociationEnd, target: AssociationEnd) -> Self {
        Self {
            name: name.into(),
            source,
            target,
        }
    }

    pub fn end(&self, side: EndSide) -> &AssociationEnd {
        match side {
            EndSide::Source => &self.source,
            EndSide::Target => &self.target,
        }
    }
}

/// Diagnostic categories reported by registry validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    DanglingSuperclass,
    DanglingEndType,
    CircularInheritance,
}

/// A non-fatal finding from [`MetamodelRegistry::validate`]
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The class or association the finding is about
    pub subject: String,
    pub message: String,
}

/// Metamodel registry errors
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Class already registered: {0}")]
    DuplicateClass(String),

    #[error("Association already registered: {0}")]
    DuplicateAssociation(String),

    #[error("Registration is closed: indexes already built")]
    RegistrationClosed,

    #[error("Circular inheritance involving class: {0}")]
    CircularInheritance(String),
}

/// Type alias for schema operation results
pub type SchemaResult<T> = Result<T, SchemaError>;
