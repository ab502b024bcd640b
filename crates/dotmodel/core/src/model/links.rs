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

//! Link graph
//!
//! Directed, typed edges between element ids. The primary edge map is
//! shadowed by two auxiliary indices keyed by endpoint and association
//! name, so every lookup is amortized O(fan-out of the queried endpoint)
//! rather than O(total edges).

use dotmodel_common::{ElementId, LinkId};
use std::collections::HashMap;

/// A typed edge between two elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub association: String,
    pub source: ElementId,
    pub target: ElementId,
}

type EndpointIndex = HashMap<ElementId, HashMap<String, Vec<LinkId>>>;

/// Edge storage with by-source and by-target indices
#[derive(Debug, Default)]
pub struct LinkGraph {
    links: HashMap<LinkId, Link>,
    by_source: EndpointIndex,
    by_target: EndpointIndex,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Insert an edge and index it on both endpoints
    pub fn add_edge(&mut self, association: impl Into<String>, source: ElementId, target: ElementId) -> LinkId {
        let id = LinkId::new();
        let association = association.into();
        self.by_source.entry(source).or_default().entry(association.clone()).or_default().push(id);
        self.by_target.entry(target).or_default().entry(association.clone()).or_default().push(id);
        self.links.insert(id, Link { id, association, source, target });
        id
    }

    /// Remove an edge by id, returning it if it existed
    pub fn remove_edge(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        Self::unindex(&mut self.by_source, link.source, &link.association, id);
        Self::unindex(&mut self.by_target, link.target, &link.association, id);
        Some(link)
    }

    /// Remove every edge touching the element, returning them
    pub fn remove_edges_for_element(&mut self, id: ElementId) -> Vec<Link> {
        let link_ids: Vec<LinkId> = self.links_for_element(id).iter().map(|l| l.id).collect();
        link_ids.into_iter().filter_map(|lid| self.remove_edge(lid)).collect()
    }

    /// First edge matching (source, target, association), if any
    pub fn find_edge(&self, source: ElementId, target: ElementId, association: &str) -> Option<LinkId> {
        self.by_source
            .get(&source)?
            .get(association)?
            .iter()
            .find(|lid| self.links.get(lid).is_some_and(|l| l.target == target))
            .copied()
    }

    /// Targets of the element's outgoing edges under an association,
    /// insertion-ordered
    pub fn targets(&self, source: ElementId, association: &str) -> Vec<ElementId> {
        self.by_source
            .get(&source)
            .and_then(|m| m.get(association))
            .map(|ids| ids.iter().filter_map(|lid| self.links.get(lid)).map(|l| l.target).collect())
            .unwrap_or_default()
    }

    /// Sources of the element's incoming edges under an association
    pub fn sources(&self, target: ElementId, association: &str) -> Vec<ElementId> {
        self.by_target
            .get(&target)
            .and_then(|m| m.get(association))
            .map(|ids| ids.iter().filter_map(|lid| self.links.get(lid)).map(|l| l.source).collect())
            .unwrap_or_default()
    }

    /// Every edge touching the element, in either direction
    pub fn links_for_element(&self, id: ElementId) -> Vec<&Link> {
        let mut result: Vec<&Link> = Vec::new();
        if let Some(per_assoc) = self.by_source.get(&id) {
            for link_ids in per_assoc.values() {
                result.extend(link_ids.iter().filter_map(|lid| self.links.get(lid)));
            }
        }
        if let Some(per_assoc) = self.by_target.get(&id) {
            for link_ids in per_assoc.values() {
                // Self-loops were already collected from the source index.
                result.extend(link_ids.iter().filter_map(|lid| self.links.get(lid)).filter(|l| l.source != id));
            }
        }
        result
    }

    fn unindex(index: &mut EndpointIndex, endpoint: ElementId, association: &str, id: LinkId) {
        if let Some(per_assoc) = index.get_mut(&endpoint) {
            if let Some(ids) = per_assoc.get_mut(association) {
                ids.retain(|lid| *lid != id);
                if ids.is_empty() {
                    per_assoc.remove(association);
                }
            }
            if per_assoc.is_empty() {
                index.remove(&endpoint);
            }
        }
    }
}
