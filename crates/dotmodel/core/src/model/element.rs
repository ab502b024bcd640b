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

//! Elements and the element factory
//!
//! An element is a uniform, string-keyed record: id, class name, stored
//! attribute values, and a derivation cache. Legality of reads and writes
//! is enforced by the instance store against the metamodel registry, not
//! by per-class code. The factory is pluggable so embedders can specialize
//! the in-memory representation per class.

use crate::schema::MetaClass;
use dotmodel_common::{ElementId, Value};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A typed node in the object graph
#[derive(Debug)]
pub struct Element {
    id: ElementId,
    class_name: String,
    values: HashMap<String, Value>,
    // Interior-mutable so shared property reads can populate it.
    derived_cache: RwLock<HashMap<String, Value>>,
}

impl Element {
    pub fn new(class_name: impl Into<String>, id: ElementId) -> Self {
        Self {
            id,
            class_name: class_name.into(),
            values: HashMap::new(),
            derived_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Raw stored value, no schema checks
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Raw stored write, no schema checks; returns the previous value
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    /// Names and values of all stored attributes
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Cached result of a derived property, if still valid
    pub fn cached_derived(&self, name: &str) -> Option<Value> {
        self.derived_cache.read().get(name).cloned()
    }

    pub fn cache_derived(&self, name: impl Into<String>, value: Value) {
        self.derived_cache.write().insert(name.into(), value);
    }

    /// Drop cached derivations for the given property names
    pub fn invalidate_derived(&self, names: &[&str]) {
        let mut cache = self.derived_cache.write();
        for name in names {
            cache.remove(*name);
        }
    }

    /// Drop the entire derivation cache
    pub fn clear_derived_cache(&self) {
        self.derived_cache.write().clear();
    }
}

/// Pluggable element construction
pub trait ElementFactory: Send + Sync {
    fn create(&self, class: &MetaClass, id: ElementId) -> Element;
}

/// Factory producing plain elements with no pre-populated values
#[derive(Debug, Default)]
pub struct DefaultElementFactory;

impl ElementFactory for DefaultElementFactory {
    fn create(&self, class: &MetaClass, id: ElementId) -> Element {
        Element::new(class.name.clone(), id)
    }
}
