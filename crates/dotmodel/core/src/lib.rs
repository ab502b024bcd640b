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

//! dotModel Core
//!
//! A reflective, schema-driven, in-memory object-graph engine. The engine
//! holds typed elements and typed links between them, resolves properties
//! (stored, derived, or relationship-navigated) against a pluggable
//! metamodel, and keeps derived indices consistent as the graph mutates.
//!
//! Module dependency order, leaves first:
//!
//! - [`schema`] — metamodel registry: class/association definitions plus
//!   the precomputed lookup indices (subclass table, redefinition and
//!   subsetting reverse indexes, per-class association ends, ownership
//!   roles).
//! - [`model`] — the instance store and link graph: element arena, typed
//!   edges, property resolution, cascade delete, element serialization.
//! - [`events`] — synchronous, priority-ordered lifecycle event dispatch.
//! - [`naming`] — the qualified-name index, built once and maintained
//!   incrementally from lifecycle events.
//! - [`resolve`] — two-phase resolution of textual forward references
//!   recorded during bulk construction.
//! - [`eval`] — the expression-evaluator and engine-accessor boundaries
//!   through which derived values, constraints, and operation bodies are
//!   computed by external language implementations.

pub mod eval;
pub mod events;
pub mod model;
pub mod naming;
pub mod resolve;
pub mod schema;

pub use dotmodel_common::{Cardinality, ElementId, LinkId, ScalarValue, Value};
pub use eval::{EngineAccessor, EvalError, ExpressionEvaluator, ValidationError};
pub use events::{LifecycleBus, LifecycleEvent, LifecycleHandler, DEFAULT_PRIORITY, NAME_INDEX_PRIORITY};
pub use model::{Element, ElementFactory, InstanceStore, Link, SerializationMode, StoreError, StoreResult, serialize_element};
pub use naming::{DefaultNamingStrategy, NamingStrategy, QualifiedNameIndex};
pub use resolve::{PendingReference, ReferenceCollector, ResolveError, resolve_all};
pub use schema::{
    AggregationKind, AssociationEnd, EndSide, MetaAssociation, MetaAttribute, MetaClass, MetaConstraint,
    MetaOperation, MetamodelRegistry, OwnershipBinding, OwnershipRole, SchemaError, SchemaResult,
};
