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

//! Reference resolution
//!
//! Bulk construction records textual cross-references instead of chasing
//! them immediately: the target may not exist yet. Once the graph is loaded
//! and the qualified-name index built, [`resolve_all`] drains the recorded
//! [`PendingReference`]s, looks each name up, and writes the resolved id
//! back through the store's property layer.
//!
//! Lookup falls back from exact qualified name to a global simple-name
//! match, then to a namespace-scoped match when the recording site supplied
//! a namespace. References recorded in a redefinition context invert the
//! last two passes, preferring the local namespace over a global match.

use crate::model::{InstanceStore, StoreError};
use crate::naming::QualifiedNameIndex;
use dotmodel_common::{ElementId, Value};

/// A textual reference captured during bulk construction, to be resolved
/// once the graph is complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReference {
    /// Element whose property will receive the resolved id
    pub source: ElementId,
    /// Property (attribute or association end) to assign
    pub property: String,
    /// Qualified or simple name of the intended target
    pub target_name: String,
    /// Namespace to scope the simple-name fallback to, if known
    pub namespace: Option<ElementId>,
    /// Recorded while processing a redefinition, where local names shadow
    /// global ones
    pub redefinition_context: bool,
}

impl PendingReference {
    pub fn new(source: ElementId, property: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source,
            property: property.into(),
            target_name: target_name.into(),
            namespace: None,
            redefinition_context: false,
        }
    }

    pub fn in_namespace(mut self, namespace: ElementId) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn redefinition(mut self) -> Self {
        self.redefinition_context = true;
        self
    }
}

/// Accumulates pending references in recording order
#[derive(Debug, Default)]
pub struct ReferenceCollector {
    pending: Vec<PendingReference>,
}

impl ReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reference: PendingReference) {
        self.pending.push(reference);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the recorded batch, leaving the collector empty
    pub fn drain(&mut self) -> Vec<PendingReference> {
        std::mem::take(&mut self.pending)
    }
}

/// Errors from the resolution pass
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unresolved reference '{name}' for property '{property}' of element {element}")]
    UnresolvedReference { name: String, element: ElementId, property: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drain the collector and resolve every recorded reference against the
/// index, assigning each resolved target through the store
///
/// References whose source element no longer exists are logged and
/// skipped. The first name that resolves nowhere aborts the pass; the
/// batch was already drained, so the remainder is abandoned with it.
/// Returns the number of references assigned.
pub fn resolve_all(store: &mut InstanceStore, index: &QualifiedNameIndex, collector: &mut ReferenceCollector) -> Result<usize, ResolveError> {
    let pending = collector.drain();
    tracing::debug!(pending = pending.len(), "resolving recorded references");

    let mut resolved = 0;
    for reference in pending {
        if store.element(reference.source).is_none() {
            tracing::warn!(
                source = %reference.source,
                name = %reference.target_name,
                "skipping reference recorded by an element no longer in the store"
            );
            continue;
        }
        let Some(target) = lookup(index, &reference) else {
            return Err(ResolveError::UnresolvedReference {
                name: reference.target_name,
                element: reference.source,
                property: reference.property,
            });
        };
        store.set_property(reference.source, &reference.property, Value::Reference(target))?;
        resolved += 1;
    }
    Ok(resolved)
}

fn lookup(index: &QualifiedNameIndex, reference: &PendingReference) -> Option<ElementId> {
    if let Some(id) = index.resolve(&reference.target_name) {
        return Some(id);
    }
    let simple = reference.target_name.rsplit(index.separator()).next().unwrap_or(&reference.target_name);
    let scoped = || reference.namespace.and_then(|ns| index.resolve_in_namespace(ns, simple));
    if reference.redefinition_context {
        scoped().or_else(|| index.resolve_simple_name(simple))
    } else {
        index.resolve_simple_name(simple).or_else(scoped)
    }
}
