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

//! Instance model
//!
//! The element arena, the typed link graph, and the instance store that
//! owns both. Elements are keyed by id and never hold direct references to
//! each other; association membership lives entirely in the link graph.

mod element;
mod links;
mod serialize;
mod store;

pub use element::{DefaultElementFactory, Element, ElementFactory};
pub use links::{Link, LinkGraph};
pub use serialize::{serialize_element, SerializationMode, SUMMARY_DERIVED_ALLOWLIST};
pub use store::InstanceStore;

use crate::schema::SchemaError;
use dotmodel_common::ElementId;

/// Instance store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Cannot instantiate abstract class: {0}")]
    AbstractClass(String),

    #[error("Unknown association: {0}")]
    UnknownAssociation(String),

    #[error("Unknown element: {0}")]
    UnknownElement(ElementId),

    #[error("Unknown property '{property}' on class '{class}'")]
    UnknownProperty { class: String, property: String },

    #[error("Cannot assign to derived property '{property}' on class '{class}'")]
    DerivedPropertyWrite { class: String, property: String },

    #[error("Invalid assignment to property '{property}': {reason}")]
    InvalidAssignment { property: String, reason: String },

    #[error("Evaluation of '{expression}' failed: {message}")]
    Evaluation { expression: String, message: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Type alias for instance store operation results
pub type StoreResult<T> = Result<T, StoreError>;
