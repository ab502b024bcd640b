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

//! Qualified-name index
//!
//! Bidirectional id↔qualified-name maps over the ownership sub-tree of
//! the graph, plus a private copy of that tree (parent map + ordered child
//! lists) used for incremental maintenance independently of the live link
//! graph. Built once by breadth-first traversal from the roots, then kept
//! current by lifecycle events; a `suspended` flag lets bulk construction
//! skip incremental work in favor of one terminal `build` call.
//!
//! Name uniqueness is global: the first element to claim a computed name
//! owns it, and any later element computing the identical string gets no
//! resolvable qualified name at all. All subtree walks are explicit
//! work-queues with per-call visited sets, so stack depth is independent
//! of graph depth and a cyclic ownership encoding cannot hang resolution.

use super::NamingStrategy;
use crate::events::{LifecycleEvent, LifecycleHandler};
use crate::model::InstanceStore;
use dotmodel_common::ElementId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct IndexState {
    by_id: HashMap<ElementId, String>,
    by_name: HashMap<String, ElementId>,
    parent: HashMap<ElementId, ElementId>,
    children: HashMap<ElementId, Vec<ElementId>>,
    suspended: bool,
}

impl IndexState {
    /// Remove the element's own name entries. The reverse entry is only
    /// removed when it actually points at this element; a collision loser
    /// never owned it.
    fn remove_name(&mut self, id: ElementId) {
        if let Some(qn) = self.by_id.remove(&id) {
            if self.by_name.get(&qn) == Some(&id) {
                self.by_name.remove(&qn);
            }
        }
    }

    fn attach_child(&mut self, parent: ElementId, child: ElementId) {
        if let Some(old_parent) = self.parent.insert(child, parent) {
            if old_parent != parent {
                if let Some(siblings) = self.children.get_mut(&old_parent) {
                    siblings.retain(|c| *c != child);
                }
            }
        }
        let siblings = self.children.entry(parent).or_default();
        if !siblings.contains(&child) {
            siblings.push(child);
        }
    }

    /// Subtree ids in top-down (breadth-first) order, walking the stored
    /// ownership tree with a visited guard.
    fn subtree(&self, root: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut visited: HashSet<ElementId> = HashSet::new();
        let mut queue: VecDeque<ElementId> = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            result.push(id);
            if let Some(kids) = self.children.get(&id) {
                queue.extend(kids.iter().copied());
            }
        }
        result
    }
}

/// Incrementally-maintained qualified-name index
pub struct QualifiedNameIndex {
    strategy: Arc<dyn NamingStrategy>,
    state: RwLock<IndexState>,
}

impl QualifiedNameIndex {
    pub fn new(strategy: Arc<dyn NamingStrategy>) -> Self {
        Self {
            strategy,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Suspend or resume incremental maintenance
    pub fn set_suspended(&self, suspended: bool) {
        self.state.write().suspended = suspended;
    }

    pub fn is_suspended(&self) -> bool {
        self.state.read().suspended
    }

    /// The element's qualified name, if it has a resolvable one
    pub fn qualified_name(&self, id: ElementId) -> Option<String> {
        self.state.read().by_id.get(&id).cloned()
    }

    /// The element owning the given qualified name
    pub fn resolve(&self, qualified_name: &str) -> Option<ElementId> {
        self.state.read().by_name.get(qualified_name).copied()
    }

    pub fn len(&self) -> usize {
        self.state.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().by_id.is_empty()
    }

    /// The strategy's segment separator
    pub fn separator(&self) -> &str {
        self.strategy.separator()
    }

    /// Find an element whose qualified name ends in the given simple name
    ///
    /// Scans all indexed names; ties resolve to the lexicographically
    /// smallest qualified name, for determinism.
    pub fn resolve_simple_name(&self, simple: &str) -> Option<ElementId> {
        let state = self.state.read();
        let mut candidates: Vec<(&String, &ElementId)> = state
            .by_name
            .iter()
            .filter(|(qn, _)| Self::last_segment(qn, self.strategy.separator()) == simple)
            .collect();
        candidates.sort_by_key(|(qn, _)| qn.as_str());
        candidates.first().map(|(_, id)| **id)
    }

    /// Find a direct child of the namespace whose local segment matches
    ///
    /// Best-effort scoped pass used by reference resolution; walks the
    /// stored ownership tree, not the live graph.
    pub fn resolve_in_namespace(&self, namespace: ElementId, simple: &str) -> Option<ElementId> {
        let state = self.state.read();
        let children = state.children.get(&namespace)?;
        children
            .iter()
            .find(|child| {
                state
                    .by_id
                    .get(child)
                    .is_some_and(|qn| Self::last_segment(qn, self.strategy.separator()) == simple)
            })
            .copied()
    }

    fn last_segment<'a>(qualified_name: &'a str, separator: &str) -> &'a str {
        qualified_name.rsplit(separator).next().unwrap_or(qualified_name)
    }

    /// Rebuild the whole index from the current graph
    ///
    /// Breadth-first from every root element (no owner), in sorted-id order
    /// so collision outcomes are deterministic. Unnamed elements get no
    /// qualified name but are still tracked in the ownership tree.
    pub fn build(&self, store: &InstanceStore) {
        let mut state = self.state.write();
        state.by_id.clear();
        state.by_name.clear();
        state.parent.clear();
        state.children.clear();

        let roots: Vec<ElementId> = store.element_ids().into_iter().filter(|id| store.owner_of(*id).is_none()).collect();
        tracing::debug!(roots = roots.len(), elements = store.element_count(), "building qualified-name index");

        let mut visited: HashSet<ElementId> = HashSet::new();
        let mut queue: VecDeque<ElementId> = roots.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            self.index_one(&mut state, store, id);
            for child in self.strategy.owned_children(store, id) {
                state.attach_child(id, child);
                queue.push_back(child);
            }
        }
    }

    /// Compute and record one element's qualified name from its tracked
    /// parent's current name. No entry for unnamed elements, children of
    /// unnamed parents, or collision losers.
    fn index_one(&self, state: &mut IndexState, store: &InstanceStore, id: ElementId) {
        let Some(element) = store.element(id) else {
            return;
        };
        let Some(local) = self.strategy.local_name(element) else {
            return;
        };
        let escaped = self.strategy.escape(&local);
        let qualified = match state.parent.get(&id) {
            Some(parent) => match state.by_id.get(parent) {
                Some(parent_name) => format!("{}{}{}", parent_name, self.strategy.separator(), escaped),
                // Parent tracked but unnamed: no name path to extend.
                None => return,
            },
            None => escaped,
        };
        if state.by_name.contains_key(&qualified) {
            // Global collision: the first claimant keeps the name.
            return;
        }
        state.by_name.insert(qualified.clone(), id);
        state.by_id.insert(id, qualified);
    }

    /// Recompute the element's subtree after a rename
    ///
    /// Old entries for the element and all tracked descendants are removed
    /// first, then names are recomputed top-down from the current parent's
    /// name. Walks the stored ownership tree, not the live graph.
    fn rebuild_subtree(&self, store: &InstanceStore, root: ElementId) {
        let mut state = self.state.write();
        let subtree = state.subtree(root);
        for id in &subtree {
            state.remove_name(*id);
        }
        for id in subtree {
            self.index_one(&mut state, store, id);
        }
    }

    /// Attach a child under a parent and index it, together with any
    /// already-existing owned descendants (bulk construction may create
    /// children before attaching them).
    fn attach(&self, store: &InstanceStore, parent: ElementId, child: ElementId) {
        let mut state = self.state.write();
        state.attach_child(parent, child);
        let mut visited: HashSet<ElementId> = HashSet::new();
        let mut queue: VecDeque<ElementId> = VecDeque::from([child]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            state.remove_name(id);
            self.index_one(&mut state, store, id);
            for grandchild in self.strategy.owned_children(store, id) {
                state.attach_child(id, grandchild);
                queue.push_back(grandchild);
            }
        }
    }

    /// Detach a subtree from the ownership tree and the name maps
    ///
    /// The elements themselves are not deleted, only unindexed.
    fn detach(&self, child: ElementId) {
        let mut state = self.state.write();
        if let Some(parent) = state.parent.remove(&child) {
            if let Some(siblings) = state.children.get_mut(&parent) {
                siblings.retain(|c| *c != child);
            }
        }
        let mut visited: HashSet<ElementId> = HashSet::new();
        let mut queue: VecDeque<ElementId> = VecDeque::from([child]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            state.remove_name(id);
            for kid in state.children.remove(&id).unwrap_or_default() {
                state.parent.remove(&kid);
                queue.push_back(kid);
            }
        }
    }

    /// Drop a deleted element's own entry; tracked children are orphaned
    /// from the tree but keep whatever entries they had.
    fn forget(&self, id: ElementId) {
        let mut state = self.state.write();
        state.remove_name(id);
        if let Some(parent) = state.parent.remove(&id) {
            if let Some(siblings) = state.children.get_mut(&parent) {
                siblings.retain(|c| *c != id);
            }
        }
        for child in state.children.remove(&id).unwrap_or_default() {
            state.parent.remove(&child);
        }
    }
}

impl LifecycleHandler for QualifiedNameIndex {
    fn name(&self) -> &str {
        "qualified-name-index"
    }

    fn handle(&self, event: &LifecycleEvent, store: &InstanceStore) -> anyhow::Result<()> {
        if self.is_suspended() {
            return Ok(());
        }
        match event {
            LifecycleEvent::PropertyChanged { element, property, .. } if self.strategy.is_name_property(property) => {
                self.rebuild_subtree(store, *element);
            }
            LifecycleEvent::OwnershipEstablished { owner, owned } => {
                self.attach(store, *owner, *owned);
            }
            LifecycleEvent::OwnershipRemoved { owned } => {
                self.detach(*owned);
            }
            LifecycleEvent::InstanceDeleting { element } => {
                self.forget(*element);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NAME_INDEX_PRIORITY;
    use crate::naming::DefaultNamingStrategy;
    use crate::schema::{AssociationEnd, MetaAssociation, MetaAttribute, MetaClass, MetamodelRegistry};
    use dotmodel_common::Value;

    fn package_registry() -> Arc<MetamodelRegistry> {
        let mut registry = MetamodelRegistry::new();
        registry
            .register_class(MetaClass::new("Package").with_attribute(MetaAttribute::new("name", "String")))
            .unwrap();
        registry
            .register_association(MetaAssociation::new(
                "PackageMembers",
                AssociationEnd::new("owner", "Package").bound_one(),
                AssociationEnd::new("members", "Package").composite(),
            ))
            .unwrap();
        registry.build_indexes().unwrap();
        Arc::new(registry)
    }

    fn indexed_store() -> (InstanceStore, Arc<QualifiedNameIndex>) {
        let mut store = InstanceStore::new(package_registry());
        let index = Arc::new(QualifiedNameIndex::new(Arc::new(DefaultNamingStrategy::new())));
        store.subscribe(NAME_INDEX_PRIORITY, Arc::clone(&index) as Arc<dyn LifecycleHandler>);
        (store, index)
    }

    fn named_package(store: &mut InstanceStore, name: &str) -> ElementId {
        let id = store.create_element("Package").unwrap();
        store.set_property(id, "name", Value::text(name)).unwrap();
        id
    }

    #[test]
    fn test_build_computes_hierarchical_names() {
        let (mut store, index) = indexed_store();
        index.set_suspended(true);
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        let grandchild = named_package(&mut store, "G");
        store.link(root, child, "PackageMembers").unwrap();
        store.link(child, grandchild, "PackageMembers").unwrap();
        index.set_suspended(false);
        index.build(&store);

        assert_eq!(index.qualified_name(root), Some("R".to_string()));
        assert_eq!(index.qualified_name(child), Some("R::C".to_string()));
        assert_eq!(index.qualified_name(grandchild), Some("R::C::G".to_string()));
        assert_eq!(index.resolve("R::C::G"), Some(grandchild));
    }

    #[test]
    fn test_unnamed_elements_get_no_entry() {
        let (mut store, index) = indexed_store();
        index.set_suspended(true);
        let root = named_package(&mut store, "R");
        let anonymous = store.create_element("Package").unwrap();
        let child = named_package(&mut store, "C");
        store.link(root, anonymous, "PackageMembers").unwrap();
        store.link(anonymous, child, "PackageMembers").unwrap();
        index.build(&store);

        assert_eq!(index.qualified_name(anonymous), None);
        // A child of an unnamed parent has no name path to extend.
        assert_eq!(index.qualified_name(child), None);
    }

    #[test]
    fn test_incremental_attach_and_rename() {
        let (mut store, index) = indexed_store();
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        store.link(root, child, "PackageMembers").unwrap();

        assert_eq!(index.qualified_name(child), Some("R::C".to_string()));
        assert_eq!(index.resolve("R::C"), Some(child));

        store.set_property(child, "name", Value::text("D")).unwrap();
        assert_eq!(index.qualified_name(child), Some("R::D".to_string()));
        assert_eq!(index.resolve("R::C"), None);
        assert_eq!(index.resolve("R::D"), Some(child));
    }

    #[test]
    fn test_rename_cascades_to_descendants() {
        let (mut store, index) = indexed_store();
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        let grandchild = named_package(&mut store, "G");
        store.link(root, child, "PackageMembers").unwrap();
        store.link(child, grandchild, "PackageMembers").unwrap();

        store.set_property(root, "name", Value::text("S")).unwrap();
        assert_eq!(index.qualified_name(grandchild), Some("S::C::G".to_string()));
        assert_eq!(index.resolve("R::C::G"), None);
    }

    #[test]
    fn test_attach_indexes_preexisting_descendants() {
        let (mut store, index) = indexed_store();
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        let grandchild = named_package(&mut store, "G");
        // Bottom-up construction: grandchild attached before the child has
        // a place in the tree.
        store.link(child, grandchild, "PackageMembers").unwrap();
        assert_eq!(index.qualified_name(grandchild), Some("C::G".to_string()));

        store.link(root, child, "PackageMembers").unwrap();
        assert_eq!(index.qualified_name(child), Some("R::C".to_string()));
        assert_eq!(index.qualified_name(grandchild), Some("R::C::G".to_string()));
    }

    #[test]
    fn test_detach_unindexes_subtree() {
        let (mut store, index) = indexed_store();
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        let grandchild = named_package(&mut store, "G");
        store.link(root, child, "PackageMembers").unwrap();
        store.link(child, grandchild, "PackageMembers").unwrap();

        store.unlink(root, child, "PackageMembers").unwrap();
        assert_eq!(index.qualified_name(child), None);
        assert_eq!(index.qualified_name(grandchild), None);
        assert_eq!(index.resolve("R"), Some(root));
    }

    #[test]
    fn test_instance_deleting_removes_own_entry_only() {
        let (mut store, index) = indexed_store();
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        store.link(root, child, "PackageMembers").unwrap();

        store.remove_element(root);
        assert_eq!(index.qualified_name(root), None);
        assert_eq!(index.resolve("R"), None);
        // The child is orphaned from the tree; its stale entry survives
        // until the next build.
        assert_eq!(index.qualified_name(child), Some("R::C".to_string()));
    }

    #[test]
    fn test_global_collision_first_claimant_wins() {
        let (mut store, index) = indexed_store();
        index.set_suspended(true);
        let a = named_package(&mut store, "Dup");
        let b = named_package(&mut store, "Dup");
        index.build(&store);

        let (winner, loser) = if a < b { (a, b) } else { (b, a) };
        assert_eq!(index.resolve("Dup"), Some(winner));
        assert_eq!(index.qualified_name(winner), Some("Dup".to_string()));
        assert_eq!(index.qualified_name(loser), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_suspended_skips_incremental_work() {
        let (mut store, index) = indexed_store();
        index.set_suspended(true);
        let root = named_package(&mut store, "R");
        assert_eq!(index.qualified_name(root), None);
        index.set_suspended(false);
        index.build(&store);
        assert_eq!(index.qualified_name(root), Some("R".to_string()));
    }

    #[test]
    fn test_simple_name_resolution() {
        let (mut store, index) = indexed_store();
        let root = named_package(&mut store, "R");
        let child = named_package(&mut store, "C");
        store.link(root, child, "PackageMembers").unwrap();

        assert_eq!(index.resolve_simple_name("C"), Some(child));
        assert_eq!(index.resolve_simple_name("missing"), None);
        assert_eq!(index.resolve_in_namespace(root, "C"), Some(child));
        assert_eq!(index.resolve_in_namespace(child, "C"), None);
    }
}
