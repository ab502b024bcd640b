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

//! Lifecycle event distribution
//!
//! Instance store mutations fire events through a synchronous, priority-
//! ordered bus. Handlers run on the caller's thread, lowest priority value
//! first; a failing handler is logged and skipped, it never prevents the
//! remaining handlers from running nor unwinds the triggering mutation.
//!
//! Handlers receive a read-only view of the store, so an
//! `InstanceDeleting` observer can still query the element's relationships
//! before they are removed. Handlers that maintain derived state (such as
//! the qualified-name index) use interior mutability for their own maps.

use crate::model::InstanceStore;
use dotmodel_common::{ElementId, LinkId, Value};
use std::sync::Arc;

/// Priority used by ordinary handlers
pub const DEFAULT_PRIORITY: i32 = 100;

/// Priority of the qualified-name index handler; runs before default
/// handlers so they observe an up-to-date index.
pub const NAME_INDEX_PRIORITY: i32 = 10;

/// The closed set of lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    InstanceCreated {
        element: ElementId,
        class_name: String,
    },
    /// Fired before the element's links are removed
    InstanceDeleting {
        element: ElementId,
    },
    LinkCreated {
        link: LinkId,
        association: String,
        source: ElementId,
        target: ElementId,
    },
    LinkDeleting {
        link: LinkId,
        association: String,
        source: ElementId,
        target: ElementId,
    },
    PropertyChanged {
        element: ElementId,
        property: String,
        old: Option<Value>,
        new: Value,
    },
    /// A composite link now makes `owner` the structural owner of `owned`
    OwnershipEstablished {
        owner: ElementId,
        owned: ElementId,
    },
    OwnershipRemoved {
        owned: ElementId,
    },
}

/// A lifecycle event observer
pub trait LifecycleHandler: Send + Sync {
    /// Handler name used in dispatch failure logs
    fn name(&self) -> &str {
        "handler"
    }

    fn handle(&self, event: &LifecycleEvent, store: &InstanceStore) -> anyhow::Result<()>;
}

/// Priority-ordered handler list
#[derive(Default)]
pub struct LifecycleBus {
    // Kept sorted by (priority, registration order).
    handlers: Vec<(i32, u64, Arc<dyn LifecycleHandler>)>,
    next_seq: u64,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; lower priority values run first, ties run in
    /// registration order.
    pub fn subscribe(&mut self, priority: i32, handler: Arc<dyn LifecycleHandler>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.handlers.push((priority, seq, handler));
        self.handlers.sort_by_key(|(p, s, _)| (*p, *s));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Snapshot of the handler list in dispatch order
    ///
    /// Dispatch iterates a snapshot so the store can be handed to handlers
    /// as a shared reference while the bus itself stays untouched.
    pub fn snapshot(&self) -> Vec<Arc<dyn LifecycleHandler>> {
        self.handlers.iter().map(|(_, _, h)| Arc::clone(h)).collect()
    }
}

/// Dispatch an event to every handler in priority order
///
/// Handler failures are logged and swallowed.
pub fn dispatch(handlers: &[Arc<dyn LifecycleHandler>], event: &LifecycleEvent, store: &InstanceStore) {
    for handler in handlers {
        if let Err(e) = handler.handle(event, store) {
            tracing::warn!(handler = handler.name(), error = %e, ?event, "lifecycle handler failed");
        }
    }
}
