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

//! Element serialization
//!
//! Renders an element as a flat JSON map: an `@id` field, an `@type` tag,
//! stored attribute values, and association-end values as bare id
//! references rather than embedded objects. Summary mode omits expensive
//! derived properties except a small always-included allowlist of display
//! name fields.

use super::store::InstanceStore;
use super::{StoreError, StoreResult};
use dotmodel_common::{ElementId, Value};

/// Derived properties always included in summary mode
pub const SUMMARY_DERIVED_ALLOWLIST: &[&str] = &["name", "shortName", "qualifiedName"];

/// How much of an element to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationMode {
    /// Every attribute and navigable end
    Full,
    /// Skip derived properties outside the display-name allowlist
    Summary,
}

fn include_derived(mode: SerializationMode, derived: bool, name: &str) -> bool {
    !derived || mode == SerializationMode::Full || SUMMARY_DERIVED_ALLOWLIST.contains(&name)
}

/// Render an element to its wire-format map
pub fn serialize_element(store: &InstanceStore, id: ElementId, mode: SerializationMode) -> StoreResult<serde_json::Value> {
    let element = store.element(id).ok_or(StoreError::UnknownElement(id))?;
    let class = element.class_name().to_string();
    let registry = store.registry();

    let mut map = serde_json::Map::new();
    map.insert("@id".to_string(), serde_json::Value::String(id.to_string()));
    map.insert("@type".to_string(), serde_json::Value::String(class.clone()));

    // Attributes, most-derived definition first; an inherited attribute
    // shadowed by a subclass definition renders once.
    let mut class_chain: Vec<&str> = vec![class.as_str()];
    class_chain.extend(registry.all_superclasses(&class).iter().map(String::as_str));
    for class_name in class_chain {
        let Some(meta) = registry.class(class_name) else { continue };
        for attr in &meta.attributes {
            if map.contains_key(&attr.name) || !include_derived(mode, attr.derived, &attr.name) {
                continue;
            }
            let value = store.get_property(id, &attr.name)?.unwrap_or(Value::Null);
            map.insert(attr.name.clone(), value.to_json());
        }
    }

    for entry in registry.association_ends_for_class(&class) {
        let Some(assoc) = registry.association(&entry.association) else {
            continue;
        };
        let end = assoc.end(entry.end);
        if !end.navigable || map.contains_key(&end.name) || !include_derived(mode, end.derived, &end.name) {
            continue;
        }
        let value = store.get_property(id, &end.name)?.unwrap_or(Value::Null);
        map.insert(end.name.clone(), value.to_json());
    }

    Ok(serde_json::Value::Object(map))
}
