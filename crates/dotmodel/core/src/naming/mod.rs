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

//! Qualified naming
//!
//! A qualified name is the separator-joined path of local names along an
//! element's ownership ancestry. The [`QualifiedNameIndex`] computes these
//! once over the whole graph and then maintains them incrementally from
//! lifecycle events. What counts as a "local name", how children are
//! enumerated, and how names are escaped is supplied by a pluggable
//! [`NamingStrategy`].

mod index;

pub use index::QualifiedNameIndex;

use crate::model::{Element, InstanceStore};
use dotmodel_common::ElementId;

/// Naming policy consulted by the qualified-name index
pub trait NamingStrategy: Send + Sync {
    /// Segment separator, e.g. `::`
    fn separator(&self) -> &str;

    /// An element's own name, read cheaply (no derivation calls)
    fn local_name(&self, element: &Element) -> Option<String>;

    /// Escape a raw local name for use as a path segment
    fn escape(&self, raw: &str) -> String {
        raw.to_string()
    }

    /// Structurally-owned children, via direct graph traversal
    fn owned_children(&self, store: &InstanceStore, id: ElementId) -> Vec<ElementId>;

    /// Whether a change to this property renames the element
    fn is_name_property(&self, property: &str) -> bool;
}

/// Strategy reading the local name from a stored attribute and children
/// from composite links
#[derive(Debug, Clone)]
pub struct DefaultNamingStrategy {
    separator: String,
    name_attribute: String,
}

impl DefaultNamingStrategy {
    pub fn new() -> Self {
        Self {
            separator: "::".to_string(),
            name_attribute: "name".to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_name_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.name_attribute = attribute.into();
        self
    }
}

impl Default for DefaultNamingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl NamingStrategy for DefaultNamingStrategy {
    fn separator(&self) -> &str {
        &self.separator
    }

    fn local_name(&self, element: &Element) -> Option<String> {
        let name = element.value(&self.name_attribute)?.as_text()?;
        if name.is_empty() { None } else { Some(name.to_string()) }
    }

    fn escape(&self, raw: &str) -> String {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            raw.to_string()
        } else {
            format!("'{}'", raw)
        }
    }

    fn owned_children(&self, store: &InstanceStore, id: ElementId) -> Vec<ElementId> {
        store.owned_children(id)
    }

    fn is_name_property(&self, property: &str) -> bool {
        property == self.name_attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_names_untouched() {
        let strategy = DefaultNamingStrategy::new();
        assert_eq!(strategy.escape("Engine_2"), "Engine_2");
    }

    #[test]
    fn test_escape_quotes_awkward_names() {
        let strategy = DefaultNamingStrategy::new();
        assert_eq!(strategy.escape("two words"), "'two words'");
        assert_eq!(strategy.escape("a::b"), "'a::b'");
    }

    #[test]
    fn test_local_name_ignores_empty() {
        use dotmodel_common::Value;
        let mut element = Element::new("Part", ElementId::new());
        let strategy = DefaultNamingStrategy::new();
        assert_eq!(strategy.local_name(&element), None);
        element.set_value("name", Value::text(""));
        assert_eq!(strategy.local_name(&element), None);
        element.set_value("name", Value::text("axle"));
        assert_eq!(strategy.local_name(&element), Some("axle".to_string()));
    }

    #[test]
    fn test_is_name_property() {
        let strategy = DefaultNamingStrategy::new().with_name_attribute("shortName");
        assert!(strategy.is_name_property("shortName"));
        assert!(!strategy.is_name_property("name"));
    }
}
