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

//! Instance store
//!
//! Owns the element arena and the link graph, consults the metamodel
//! registry for every type decision, and fires lifecycle events on each
//! mutation. Single-writer: mutating operations expect one logical caller
//! at a time and take `&mut self`; reads are shared.
//!
//! Property resolution order: stored/derived attributes across the class
//! hierarchy first (most-derived first), then association ends applicable
//! to the class. Navigated ends report the union of the primary
//! association's links and the links of every association whose end
//! redefines or subsets the property name, so a property historically
//! backed by several specializing associations still reports the full
//! value set under the general name.

use super::element::{DefaultElementFactory, Element, ElementFactory};
use super::links::{Link, LinkGraph};
use super::{StoreError, StoreResult};
use crate::eval::{EngineAccessor, EvaluatorRegistry, ExpressionEvaluator, ValidationError};
use crate::events::{self, LifecycleBus, LifecycleEvent, LifecycleHandler};
use crate::schema::{
    AggregationKind, ClassAssociationEnd, EndRef, EndSide, MetaConstraint, MetamodelRegistry, PROPERTY_REF_LANGUAGE,
};
use dotmodel_common::{ElementId, LinkId, ScalarValue, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Outcome of delegating to an expression evaluator
enum EvalOutcome {
    Value(Value),
    /// No evaluator registered for the language; already logged
    NoEvaluator,
    Failed(String),
}

/// The in-memory object-graph store
pub struct InstanceStore {
    registry: Arc<MetamodelRegistry>,
    elements: HashMap<ElementId, Element>,
    links: LinkGraph,
    bus: LifecycleBus,
    factory: Box<dyn ElementFactory>,
    evaluators: EvaluatorRegistry,
}

impl InstanceStore {
    pub fn new(registry: Arc<MetamodelRegistry>) -> Self {
        Self::with_factory(registry, Box::new(DefaultElementFactory))
    }

    pub fn with_factory(registry: Arc<MetamodelRegistry>, factory: Box<dyn ElementFactory>) -> Self {
        Self {
            registry,
            elements: HashMap::new(),
            links: LinkGraph::new(),
            bus: LifecycleBus::new(),
            factory,
            evaluators: EvaluatorRegistry::new(),
        }
    }

    pub fn registry(&self) -> &MetamodelRegistry {
        &self.registry
    }

    /// Register a lifecycle handler; lower priority values run first
    pub fn subscribe(&mut self, priority: i32, handler: Arc<dyn LifecycleHandler>) {
        self.bus.subscribe(priority, handler);
    }

    /// Register an expression evaluator for a language tag
    pub fn register_evaluator(&mut self, language: impl Into<String>, evaluator: Arc<dyn ExpressionEvaluator>) {
        self.evaluators.register(language, evaluator);
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// All element ids in sorted order, for deterministic bulk traversal
    pub fn element_ids(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self.elements.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn links_for_element(&self, id: ElementId) -> Vec<&Link> {
        self.links.links_for_element(id)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn fire(&self, event: &LifecycleEvent) {
        let handlers = self.bus.snapshot();
        events::dispatch(&handlers, event, self);
    }

    /// Create an element of the given class
    ///
    /// Fails fast on unknown or abstract classes. Fires `InstanceCreated`.
    pub fn create_element(&mut self, class_name: &str) -> StoreResult<ElementId> {
        let registry = Arc::clone(&self.registry);
        let class = registry.class(class_name).ok_or_else(|| StoreError::UnknownClass(class_name.to_string()))?;
        if class.is_abstract {
            return Err(StoreError::AbstractClass(class_name.to_string()));
        }
        let id = ElementId::new();
        let element = self.factory.create(class, id);
        self.elements.insert(id, element);
        self.fire(&LifecycleEvent::InstanceCreated {
            element: id,
            class_name: class_name.to_string(),
        });
        Ok(id)
    }

    /// Remove an element and every link touching it
    ///
    /// `InstanceDeleting` fires before edge removal, so observers can still
    /// query the element's relationships. The edge teardown itself is
    /// silent: no per-link events fire, which leaves name-index entries of
    /// owned descendants orphaned rather than detached. Returns false for
    /// an unknown id.
    pub fn remove_element(&mut self, id: ElementId) -> bool {
        if !self.elements.contains_key(&id) {
            return false;
        }
        self.fire(&LifecycleEvent::InstanceDeleting { element: id });
        let removed = self.links.remove_edges_for_element(id);
        for link in &removed {
            self.invalidate_end_caches(link);
        }
        self.elements.remove(&id);
        true
    }

    /// Delete an element and, transitively, everything it owns through
    /// composite links
    ///
    /// Breadth-first work-queue: for the current element, outgoing links
    /// whose target end has composite aggregation enqueue their targets,
    /// then the current element is deleted. Already-processed ids are
    /// skipped, which makes reentrant ownership cycles terminate. Returns
    /// the deleted ids in discovery order.
    pub fn delete_cascade(&mut self, id: ElementId) -> Vec<ElementId> {
        let mut deleted = Vec::new();
        let mut visited: HashSet<ElementId> = HashSet::new();
        let mut queue: VecDeque<ElementId> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if !self.elements.contains_key(&current) {
                continue;
            }
            let children: Vec<ElementId> = self
                .links
                .links_for_element(current)
                .iter()
                .filter(|l| l.source == current)
                .filter(|l| {
                    self.registry
                        .association(&l.association)
                        .is_some_and(|a| a.target.aggregation == AggregationKind::Composite)
                })
                .map(|l| l.target)
                .collect();
            queue.extend(children);
            self.remove_element(current);
            deleted.push(current);
        }
        deleted
    }

    /// Create a link between two elements
    ///
    /// The association must exist; the endpoints need not yet (bulk
    /// construction may link ahead of element creation). Events fire only
    /// when both endpoints currently exist as elements.
    pub fn link(&mut self, source: ElementId, target: ElementId, association: &str) -> StoreResult<LinkId> {
        let registry = Arc::clone(&self.registry);
        let assoc = registry
            .association(association)
            .ok_or_else(|| StoreError::UnknownAssociation(association.to_string()))?;
        let id = self.links.add_edge(association, source, target);
        if self.elements.contains_key(&source) && self.elements.contains_key(&target) {
            self.fire(&LifecycleEvent::LinkCreated {
                link: id,
                association: association.to_string(),
                source,
                target,
            });
            if assoc.target.aggregation == AggregationKind::Composite {
                self.fire(&LifecycleEvent::OwnershipEstablished { owner: source, owned: target });
            } else if assoc.source.aggregation == AggregationKind::Composite {
                self.fire(&LifecycleEvent::OwnershipEstablished { owner: target, owned: source });
            }
        }
        if let Some(link) = self.links.link(id) {
            let link = link.clone();
            self.invalidate_end_caches(&link);
        }
        Ok(id)
    }

    /// Remove the link between two elements under an association
    ///
    /// Returns false when no such link exists.
    pub fn unlink(&mut self, source: ElementId, target: ElementId, association: &str) -> StoreResult<bool> {
        if self.registry.association(association).is_none() {
            return Err(StoreError::UnknownAssociation(association.to_string()));
        }
        match self.links.find_edge(source, target, association) {
            Some(id) => {
                self.drop_link(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Shared link-removal path: fires `LinkDeleting` (and
    /// `OwnershipRemoved` for composite edges) while both endpoints still
    /// exist, removes the edge, and invalidates affected derivation caches.
    fn drop_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.link(id)?.clone();
        if self.elements.contains_key(&link.source) && self.elements.contains_key(&link.target) {
            self.fire(&LifecycleEvent::LinkDeleting {
                link: id,
                association: link.association.clone(),
                source: link.source,
                target: link.target,
            });
            if let Some(assoc) = self.registry.association(&link.association) {
                if assoc.target.aggregation == AggregationKind::Composite {
                    self.fire(&LifecycleEvent::OwnershipRemoved { owned: link.target });
                } else if assoc.source.aggregation == AggregationKind::Composite {
                    self.fire(&LifecycleEvent::OwnershipRemoved { owned: link.source });
                }
            }
        }
        self.links.remove_edge(id);
        self.invalidate_end_caches(&link);
        Some(link)
    }

    /// Drop cached derived values on both endpoints for the association's
    /// end names and every base name those ends redefine or subset.
    fn invalidate_end_caches(&self, link: &Link) {
        let Some(assoc) = self.registry.association(&link.association) else {
            return;
        };
        let mut names: Vec<&str> = Vec::new();
        for end in [&assoc.source, &assoc.target] {
            names.push(end.name.as_str());
            names.extend(end.redefines.iter().map(String::as_str));
            names.extend(end.subsets.iter().map(String::as_str));
        }
        for endpoint in [link.source, link.target] {
            if let Some(element) = self.elements.get(&endpoint) {
                element.invalidate_derived(&names);
            }
        }
    }

    /// The element that structurally owns `id` through a composite link
    pub fn owner_of(&self, id: ElementId) -> Option<ElementId> {
        for link in self.links.links_for_element(id) {
            let Some(assoc) = self.registry.association(&link.association) else {
                continue;
            };
            if link.target == id && assoc.target.aggregation == AggregationKind::Composite {
                return Some(link.source);
            }
            if link.source == id && assoc.source.aggregation == AggregationKind::Composite {
                return Some(link.target);
            }
        }
        None
    }

    /// Elements structurally owned by `id` through composite links
    pub fn owned_children(&self, id: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for link in self.links.links_for_element(id) {
            let Some(assoc) = self.registry.association(&link.association) else {
                continue;
            };
            let child = if link.source == id && assoc.target.aggregation == AggregationKind::Composite {
                Some(link.target)
            } else if link.target == id && assoc.source.aggregation == AggregationKind::Composite {
                Some(link.source)
            } else {
                None
            };
            if let Some(child) = child {
                if seen.insert(child) {
                    result.push(child);
                }
            }
        }
        result
    }

    /// Resolve a property on an element
    ///
    /// Returns `Ok(None)` when the name matches neither an attribute nor an
    /// applicable association end ("not found"), `Ok(Some(Value::Null))`
    /// when the property exists but carries no value. An unknown element id
    /// yields an empty result, not an error.
    pub fn get_property(&self, id: ElementId, name: &str) -> StoreResult<Option<Value>> {
        let Some(element) = self.elements.get(&id) else {
            return Ok(None);
        };
        let class = element.class_name();

        if let Some(attr) = self.registry.find_attribute(class, name) {
            if attr.derived {
                if let Some(cached) = element.cached_derived(name) {
                    return Ok(Some(cached));
                }
                let Some(derivation) = &attr.derivation else {
                    return Ok(Some(Value::Null));
                };
                return match self.evaluate(derivation, id) {
                    EvalOutcome::Value(value) => {
                        element.cache_derived(name, value.clone());
                        Ok(Some(value))
                    }
                    EvalOutcome::NoEvaluator => Ok(Some(Value::Null)),
                    EvalOutcome::Failed(message) => Err(StoreError::Evaluation {
                        expression: derivation.expression.clone(),
                        message,
                    }),
                };
            }
            return Ok(Some(element.value(name).cloned().unwrap_or(Value::Null)));
        }

        for entry in self.registry.association_ends_for_class(class) {
            let Some(assoc) = self.registry.association(&entry.association) else {
                continue;
            };
            let end = assoc.end(entry.end);
            if end.name != name {
                continue;
            }
            if end.derived {
                if let Some(cached) = element.cached_derived(name) {
                    return Ok(Some(cached));
                }
                if let Some(derivation) = &end.derivation {
                    return match self.evaluate(derivation, id) {
                        EvalOutcome::Value(value) => {
                            let value = Value::from_reference_ids(value.reference_ids(), end.cardinality);
                            element.cache_derived(name, value.clone());
                            Ok(Some(value))
                        }
                        EvalOutcome::NoEvaluator => Ok(Some(Value::Null)),
                        EvalOutcome::Failed(message) => Err(StoreError::Evaluation {
                            expression: derivation.expression.clone(),
                            message,
                        }),
                    };
                }
                // Derived end without a recorded derivation navigates like
                // a plain end.
            }
            let ids = self.navigate_with_closure(id, class, entry, name);
            return Ok(Some(Value::from_reference_ids(ids, end.cardinality)));
        }

        Ok(None)
    }

    /// Union of the primary association's links and the links of every
    /// redefining/subsetting end compatible with the element's class,
    /// id-deduplicated, restricted to live elements.
    fn navigate_with_closure(
        &self,
        id: ElementId,
        class: &str,
        primary: &ClassAssociationEnd,
        property: &str,
    ) -> Vec<ElementId> {
        let mut seen: HashSet<ElementId> = HashSet::new();
        let mut result: Vec<ElementId> = Vec::new();
        let extend = |ids: Vec<ElementId>, result: &mut Vec<ElementId>, seen: &mut HashSet<ElementId>| {
            for other in ids {
                if self.elements.contains_key(&other) && seen.insert(other) {
                    result.push(other);
                }
            }
        };
        extend(self.navigate_end(id, &primary.association, primary.end), &mut result, &mut seen);
        for end_ref in self.registry.redefining_ends(property) {
            if self.far_side_compatible(class, end_ref) {
                extend(self.navigate_end(id, &end_ref.association, end_ref.side), &mut result, &mut seen);
            }
        }
        for end_ref in self.registry.subsetting_ends(property) {
            if self.far_side_compatible(class, end_ref) {
                extend(self.navigate_end(id, &end_ref.association, end_ref.side), &mut result, &mut seen);
            }
        }
        result
    }

    fn navigate_end(&self, id: ElementId, association: &str, side: EndSide) -> Vec<ElementId> {
        match side {
            EndSide::Target => self.links.targets(id, association),
            EndSide::Source => self.links.sources(id, association),
        }
    }

    /// The navigating element sits on the side opposite the property end;
    /// its class must be compatible with that side's related type.
    fn far_side_compatible(&self, class: &str, end_ref: &EndRef) -> bool {
        self.registry
            .association(&end_ref.association)
            .is_some_and(|a| self.registry.is_subclass_of(class, &a.end(end_ref.side.opposite()).related_type))
    }

    /// Assign a property value
    ///
    /// Stored attributes mutate in place and fire `PropertyChanged`.
    /// Derived properties reject assignment. Association ends are
    /// reconciled: the desired target-id set is diffed against the primary
    /// association's current links and the minimal set of link/unlink calls
    /// is issued; redefining and subsetting views stay consistent through
    /// the navigation closure.
    pub fn set_property(&mut self, id: ElementId, name: &str, value: Value) -> StoreResult<()> {
        let registry = Arc::clone(&self.registry);
        let class = self
            .elements
            .get(&id)
            .ok_or(StoreError::UnknownElement(id))?
            .class_name()
            .to_string();

        if let Some(attr) = registry.find_attribute(&class, name) {
            if attr.derived {
                return Err(StoreError::DerivedPropertyWrite {
                    class,
                    property: name.to_string(),
                });
            }
            let element = self.elements.get_mut(&id).ok_or(StoreError::UnknownElement(id))?;
            let old = element.set_value(name, value.clone());
            self.fire(&LifecycleEvent::PropertyChanged {
                element: id,
                property: name.to_string(),
                old,
                new: value,
            });
            return Ok(());
        }

        for entry in registry.association_ends_for_class(&class) {
            let Some(assoc) = registry.association(&entry.association) else {
                continue;
            };
            let end = assoc.end(entry.end);
            if end.name != name {
                continue;
            }
            if end.derived {
                return Err(StoreError::DerivedPropertyWrite {
                    class,
                    property: name.to_string(),
                });
            }
            if matches!(value, Value::Scalar(_)) {
                return Err(StoreError::InvalidAssignment {
                    property: name.to_string(),
                    reason: "scalar value assigned to an association end".to_string(),
                });
            }
            let desired = value.reference_ids();
            let current = self.navigate_end(id, &entry.association, entry.end);
            let desired_set: HashSet<ElementId> = desired.iter().copied().collect();
            let current_set: HashSet<ElementId> = current.iter().copied().collect();
            for other in current.iter().filter(|o| !desired_set.contains(o)) {
                match entry.end {
                    EndSide::Target => self.unlink(id, *other, &entry.association)?,
                    EndSide::Source => self.unlink(*other, id, &entry.association)?,
                };
            }
            for other in desired.iter().filter(|o| !current_set.contains(o)) {
                match entry.end {
                    EndSide::Target => self.link(id, *other, &entry.association)?,
                    EndSide::Source => self.link(*other, id, &entry.association)?,
                };
            }
            return Ok(());
        }

        Err(StoreError::UnknownProperty {
            class,
            property: name.to_string(),
        })
    }

    /// Invoke an operation defined on the element's class
    ///
    /// A `property` body language short-circuits to a property read; other
    /// tags dispatch to the evaluator registered for the tag, or degrade to
    /// no value with a warning when none is registered.
    pub fn invoke_operation(&self, id: ElementId, name: &str, args: &[Value]) -> StoreResult<Option<Value>> {
        let element = self.elements.get(&id).ok_or(StoreError::UnknownElement(id))?;
        let class = element.class_name();
        let Some(operation) = self.registry.find_operation(class, name) else {
            return Err(StoreError::UnknownProperty {
                class: class.to_string(),
                property: name.to_string(),
            });
        };
        if operation.language == PROPERTY_REF_LANGUAGE {
            return self.get_property(id, operation.body.trim());
        }
        let Some(evaluator) = self.evaluators.get(&operation.language) else {
            tracing::warn!(language = %operation.language, operation = %name, "no evaluator registered; skipping operation");
            return Ok(None);
        };
        match evaluator.evaluate(&operation.body, id, self, args) {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(StoreError::Evaluation {
                expression: operation.body.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Run constraints over matching elements
    ///
    /// Inherited constraints are included. A missing evaluator skips the
    /// constraint with a warning; an evaluator failure or a false result
    /// becomes a validation error. The batch never aborts.
    pub fn validate_all(&self, class_filter: Option<&str>, constraint_names: Option<&[&str]>) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for id in self.element_ids() {
            let Some(element) = self.elements.get(&id) else { continue };
            let class = element.class_name();
            if let Some(filter) = class_filter {
                if !self.registry.is_subclass_of(class, filter) {
                    continue;
                }
            }
            for constraint in self.registry.constraints_for_class(class) {
                if let Some(names) = constraint_names {
                    if !names.contains(&constraint.name.as_str()) {
                        continue;
                    }
                }
                let Some(evaluator) = self.evaluators.get(&constraint.language) else {
                    tracing::warn!(language = %constraint.language, constraint = %constraint.name, "no evaluator registered; skipping constraint");
                    continue;
                };
                let outcome = evaluator.evaluate(&constraint.expression, id, self, &[]);
                let message = match outcome {
                    Ok(Value::Scalar(ScalarValue::Bool(true))) | Ok(Value::Null) => continue,
                    Ok(Value::Scalar(ScalarValue::Bool(false))) => "constraint evaluated to false".to_string(),
                    Ok(other) => format!("constraint evaluated to a non-boolean value: {:?}", other),
                    Err(e) => e.to_string(),
                };
                errors.push(ValidationError {
                    element: id,
                    class_name: class.to_string(),
                    constraint: constraint.name.clone(),
                    message,
                });
            }
        }
        errors
    }

    fn evaluate(&self, derivation: &MetaConstraint, context: ElementId) -> EvalOutcome {
        let Some(evaluator) = self.evaluators.get(&derivation.language) else {
            tracing::warn!(language = %derivation.language, "no evaluator registered; treating derived value as absent");
            return EvalOutcome::NoEvaluator;
        };
        match evaluator.evaluate(&derivation.expression, context, self, &[]) {
            Ok(value) => EvalOutcome::Value(value),
            Err(e) => EvalOutcome::Failed(e.to_string()),
        }
    }
}

impl EngineAccessor for InstanceStore {
    fn instance(&self, id: ElementId) -> Option<&Element> {
        self.element(id)
    }

    fn linked_targets(&self, id: ElementId, association: &str) -> Vec<ElementId> {
        self.links.targets(id, association)
    }

    fn linked_sources(&self, id: ElementId, association: &str) -> Vec<ElementId> {
        self.links.sources(id, association)
    }

    fn property(&self, id: ElementId, name: &str) -> StoreResult<Option<Value>> {
        self.get_property(id, name)
    }

    fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        self.registry.is_subclass_of(class, ancestor)
    }

    fn invoke(&self, id: ElementId, operation: &str, args: &[Value]) -> StoreResult<Option<Value>> {
        self.invoke_operation(id, operation, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalError;
    use crate::schema::{AssociationEnd, MetaAssociation, MetaAttribute, MetaClass, MetaOperation};
    use parking_lot::Mutex;

    fn vehicle_registry() -> Arc<MetamodelRegistry> {
        let mut registry = MetamodelRegistry::new();
        registry
            .register_class(
                MetaClass::abstract_class("Vehicle")
                    .with_attribute(MetaAttribute::new("name", "String"))
                    .with_operation(MetaOperation::new("displayName", PROPERTY_REF_LANGUAGE, "name")),
            )
            .unwrap();
        registry.register_class(MetaClass::new("Car").with_superclass("Vehicle")).unwrap();
        registry.register_class(MetaClass::new("Wheel")).unwrap();
        registry.register_class(MetaClass::new("RacingWheel").with_superclass("Wheel")).unwrap();
        registry
            .register_association(MetaAssociation::new(
                "VehicleWheels",
                AssociationEnd::new("vehicle", "Vehicle").bound_one(),
                AssociationEnd::new("wheels", "Wheel").composite(),
            ))
            .unwrap();
        registry
            .register_association(MetaAssociation::new(
                "VehicleRacingWheels",
                AssociationEnd::new("racingVehicle", "Vehicle").bound_one(),
                AssociationEnd::new("racingWheels", "RacingWheel").composite().redefining("wheels"),
            ))
            .unwrap();
        registry.build_indexes().unwrap();
        Arc::new(registry)
    }

    fn store() -> InstanceStore {
        InstanceStore::new(vehicle_registry())
    }

    #[test]
    fn test_create_element() {
        let mut store = store();
        let id = store.create_element("Car").unwrap();
        assert_eq!(store.element_count(), 1);
        assert_eq!(store.element(id).unwrap().class_name(), "Car");
    }

    #[test]
    fn test_create_unknown_class_fails() {
        let mut store = store();
        assert!(matches!(store.create_element("Hovercraft"), Err(StoreError::UnknownClass(_))));
    }

    #[test]
    fn test_create_abstract_class_fails() {
        let mut store = store();
        assert!(matches!(store.create_element("Vehicle"), Err(StoreError::AbstractClass(_))));
    }

    #[test]
    fn test_remove_element_removes_links_both_directions() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let wheel = store.create_element("Wheel").unwrap();
        store.link(car, wheel, "VehicleWheels").unwrap();
        assert!(store.remove_element(wheel));
        assert!(store.links_for_element(wheel).is_empty());
        // The link from the surviving car is gone too.
        assert!(store.links_for_element(car).is_empty());
        assert!(!store.remove_element(wheel));
    }

    #[test]
    fn test_cascade_delete_ownership_chain() {
        let mut registry = MetamodelRegistry::new();
        registry.register_class(MetaClass::new("Node")).unwrap();
        registry
            .register_association(MetaAssociation::new(
                "NodeChildren",
                AssociationEnd::new("parent", "Node").bound_one(),
                AssociationEnd::new("children", "Node").composite(),
            ))
            .unwrap();
        registry.build_indexes().unwrap();
        let mut store = InstanceStore::new(Arc::new(registry));

        let a = store.create_element("Node").unwrap();
        let b = store.create_element("Node").unwrap();
        let c = store.create_element("Node").unwrap();
        let bystander = store.create_element("Node").unwrap();
        store.link(a, b, "NodeChildren").unwrap();
        store.link(b, c, "NodeChildren").unwrap();

        let deleted = store.delete_cascade(a);
        assert_eq!(deleted, vec![a, b, c]);
        assert_eq!(store.element_count(), 1);
        assert!(store.element(bystander).is_some());
    }

    #[test]
    fn test_cascade_delete_survives_cycles() {
        let mut registry = MetamodelRegistry::new();
        registry.register_class(MetaClass::new("Node")).unwrap();
        registry
            .register_association(MetaAssociation::new(
                "NodeChildren",
                AssociationEnd::new("parent", "Node").bound_one(),
                AssociationEnd::new("children", "Node").composite(),
            ))
            .unwrap();
        registry.build_indexes().unwrap();
        let mut store = InstanceStore::new(Arc::new(registry));

        let a = store.create_element("Node").unwrap();
        let b = store.create_element("Node").unwrap();
        store.link(a, b, "NodeChildren").unwrap();
        store.link(b, a, "NodeChildren").unwrap();

        let deleted = store.delete_cascade(a);
        assert_eq!(deleted, vec![a, b]);
        assert_eq!(store.element_count(), 0);
    }

    #[test]
    fn test_link_unlink_navigation() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let wheel = store.create_element("Wheel").unwrap();
        store.link(car, wheel, "VehicleWheels").unwrap();
        assert_eq!(store.get_property(car, "wheels").unwrap(), Some(Value::ReferenceList(vec![wheel])));
        assert!(store.unlink(car, wheel, "VehicleWheels").unwrap());
        assert_eq!(store.get_property(car, "wheels").unwrap(), Some(Value::ReferenceList(vec![])));
        assert!(!store.unlink(car, wheel, "VehicleWheels").unwrap());
    }

    #[test]
    fn test_link_unknown_association_fails() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let wheel = store.create_element("Wheel").unwrap();
        assert!(matches!(store.link(car, wheel, "Nope"), Err(StoreError::UnknownAssociation(_))));
    }

    #[test]
    fn test_stored_attribute_roundtrip() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        // Attribute defined but unset: found, empty.
        assert_eq!(store.get_property(car, "name").unwrap(), Some(Value::Null));
        store.set_property(car, "name", Value::text("herbie")).unwrap();
        assert_eq!(store.get_property(car, "name").unwrap(), Some(Value::text("herbie")));
        // Unknown property: not found.
        assert_eq!(store.get_property(car, "color").unwrap(), None);
        assert!(matches!(
            store.set_property(car, "color", Value::Null),
            Err(StoreError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_missing_element_navigation_is_empty() {
        let store = store();
        assert_eq!(store.get_property(ElementId::new(), "wheels").unwrap(), None);
    }

    #[test]
    fn test_redefined_end_reports_through_base_property() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let racing = store.create_element("RacingWheel").unwrap();
        // Linked only under the redefining association.
        store.link(car, racing, "VehicleRacingWheels").unwrap();
        let value = store.get_property(car, "wheels").unwrap().unwrap();
        assert_eq!(value, Value::ReferenceList(vec![racing]));
        // The redefining property still reads directly.
        assert_eq!(store.get_property(car, "racingWheels").unwrap().unwrap(), Value::ReferenceList(vec![racing]));
    }

    #[test]
    fn test_redefinition_results_deduplicated() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let racing = store.create_element("RacingWheel").unwrap();
        store.link(car, racing, "VehicleWheels").unwrap();
        store.link(car, racing, "VehicleRacingWheels").unwrap();
        let value = store.get_property(car, "wheels").unwrap().unwrap();
        assert_eq!(value, Value::ReferenceList(vec![racing]));
    }

    #[test]
    fn test_set_association_end_diffs_links() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let w1 = store.create_element("Wheel").unwrap();
        let w2 = store.create_element("Wheel").unwrap();
        let w3 = store.create_element("Wheel").unwrap();
        store.set_property(car, "wheels", Value::ReferenceList(vec![w1, w2])).unwrap();
        assert_eq!(store.get_property(car, "wheels").unwrap().unwrap().reference_ids(), vec![w1, w2]);

        store.set_property(car, "wheels", Value::ReferenceList(vec![w2, w3])).unwrap();
        let ids = store.get_property(car, "wheels").unwrap().unwrap().reference_ids();
        assert_eq!(ids, vec![w2, w3]);
        // w1's link is gone entirely, not just hidden.
        assert!(store.links_for_element(w1).is_empty());

        store.set_property(car, "wheels", Value::Null).unwrap();
        assert!(store.get_property(car, "wheels").unwrap().unwrap().reference_ids().is_empty());
        assert_eq!(store.link_count(), 0);
    }

    #[test]
    fn test_set_bound_one_end_with_single_reference() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let wheel = store.create_element("Wheel").unwrap();
        store.set_property(wheel, "vehicle", Value::Reference(car)).unwrap();
        assert_eq!(store.get_property(wheel, "vehicle").unwrap(), Some(Value::Reference(car)));
        assert_eq!(store.get_property(car, "wheels").unwrap().unwrap().reference_ids(), vec![wheel]);
    }

    #[test]
    fn test_scalar_assigned_to_end_fails() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        assert!(matches!(
            store.set_property(car, "wheels", Value::integer(4)),
            Err(StoreError::InvalidAssignment { .. })
        ));
    }

    struct FixedEvaluator(Value);

    impl ExpressionEvaluator for FixedEvaluator {
        fn evaluate(
            &self,
            _expression: &str,
            _context: ElementId,
            _accessor: &dyn EngineAccessor,
            _args: &[Value],
        ) -> Result<Value, EvalError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEvaluator;

    impl ExpressionEvaluator for FailingEvaluator {
        fn evaluate(
            &self,
            _expression: &str,
            _context: ElementId,
            _accessor: &dyn EngineAccessor,
            _args: &[Value],
        ) -> Result<Value, EvalError> {
            Err(EvalError("boom".to_string()))
        }
    }

    fn derived_registry() -> Arc<MetamodelRegistry> {
        let mut registry = MetamodelRegistry::new();
        registry
            .register_class(MetaClass::new("Part").with_attribute(MetaAttribute::derived(
                "mass",
                "Integer",
                MetaConstraint::new("massDerivation", "calc", "sum(children.mass)"),
            )))
            .unwrap();
        registry.build_indexes().unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_derived_attribute_delegates_to_evaluator() {
        let mut store = InstanceStore::new(derived_registry());
        store.register_evaluator("calc", Arc::new(FixedEvaluator(Value::integer(7))));
        let part = store.create_element("Part").unwrap();
        assert_eq!(store.get_property(part, "mass").unwrap(), Some(Value::integer(7)));
    }

    #[test]
    fn test_derived_attribute_write_fails() {
        let mut store = InstanceStore::new(derived_registry());
        let part = store.create_element("Part").unwrap();
        assert!(matches!(
            store.set_property(part, "mass", Value::integer(1)),
            Err(StoreError::DerivedPropertyWrite { .. })
        ));
    }

    #[test]
    fn test_derived_attribute_without_evaluator_is_null() {
        let mut store = InstanceStore::new(derived_registry());
        let part = store.create_element("Part").unwrap();
        assert_eq!(store.get_property(part, "mass").unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_derived_attribute_evaluator_failure_is_error() {
        let mut store = InstanceStore::new(derived_registry());
        store.register_evaluator("calc", Arc::new(FailingEvaluator));
        let part = store.create_element("Part").unwrap();
        assert!(matches!(store.get_property(part, "mass"), Err(StoreError::Evaluation { .. })));
    }

    #[test]
    fn test_invoke_operation_property_reference() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        store.set_property(car, "name", Value::text("herbie")).unwrap();
        assert_eq!(store.invoke_operation(car, "displayName", &[]).unwrap(), Some(Value::text("herbie")));
    }

    #[test]
    fn test_invoke_operation_missing_evaluator_is_noop() {
        let mut registry = MetamodelRegistry::new();
        registry
            .register_class(MetaClass::new("Widget").with_operation(MetaOperation::new("compute", "script", "1 + 1")))
            .unwrap();
        registry.build_indexes().unwrap();
        let mut store = InstanceStore::new(Arc::new(registry));
        let widget = store.create_element("Widget").unwrap();
        assert_eq!(store.invoke_operation(widget, "compute", &[]).unwrap(), None);
    }

    #[test]
    fn test_validate_all_continues_past_failures() {
        let mut registry = MetamodelRegistry::new();
        registry
            .register_class(
                MetaClass::new("Checked")
                    .with_constraint(MetaConstraint::new("alwaysFails", "falsy", "false"))
                    .with_constraint(MetaConstraint::new("broken", "broken", "boom"))
                    .with_constraint(MetaConstraint::new("unchecked", "missing-lang", "x")),
            )
            .unwrap();
        registry.build_indexes().unwrap();
        let mut store = InstanceStore::new(Arc::new(registry));
        store.register_evaluator("falsy", Arc::new(FixedEvaluator(Value::bool(false))));
        store.register_evaluator("broken", Arc::new(FailingEvaluator));
        let a = store.create_element("Checked").unwrap();
        let b = store.create_element("Checked").unwrap();

        let errors = store.validate_all(None, None);
        // Two failing constraints per element; the missing-language one is
        // skipped, and the batch covers both elements.
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.element == a && e.constraint == "alwaysFails"));
        assert!(errors.iter().any(|e| e.element == b && e.constraint == "broken"));
    }

    #[test]
    fn test_validate_all_filters() {
        let mut registry = MetamodelRegistry::new();
        registry
            .register_class(MetaClass::new("Checked").with_constraint(MetaConstraint::new("c1", "falsy", "false")))
            .unwrap();
        registry.register_class(MetaClass::new("Other")).unwrap();
        registry.build_indexes().unwrap();
        let mut store = InstanceStore::new(Arc::new(registry));
        store.register_evaluator("falsy", Arc::new(FixedEvaluator(Value::bool(false))));
        store.create_element("Checked").unwrap();
        store.create_element("Other").unwrap();

        assert_eq!(store.validate_all(Some("Checked"), None).len(), 1);
        assert_eq!(store.validate_all(Some("Other"), None).len(), 0);
        assert_eq!(store.validate_all(None, Some(&["c1"])).len(), 1);
        assert_eq!(store.validate_all(None, Some(&["nonexistent"])).len(), 0);
    }

    #[test]
    fn test_lifecycle_events_fired_in_order() {
        struct EventLog(Mutex<Vec<String>>);

        impl LifecycleHandler for EventLog {
            fn handle(&self, event: &LifecycleEvent, _store: &InstanceStore) -> anyhow::Result<()> {
                let tag = match event {
                    LifecycleEvent::InstanceCreated { .. } => "created",
                    LifecycleEvent::InstanceDeleting { .. } => "deleting",
                    LifecycleEvent::LinkCreated { .. } => "link",
                    LifecycleEvent::LinkDeleting { .. } => "unlink",
                    LifecycleEvent::PropertyChanged { .. } => "property",
                    LifecycleEvent::OwnershipEstablished { .. } => "owned",
                    LifecycleEvent::OwnershipRemoved { .. } => "disowned",
                };
                self.0.lock().push(tag.to_string());
                Ok(())
            }
        }

        let mut store = store();
        let log = Arc::new(EventLog(Mutex::new(Vec::new())));
        store.subscribe(crate::events::DEFAULT_PRIORITY, Arc::clone(&log) as Arc<dyn LifecycleHandler>);

        let car = store.create_element("Car").unwrap();
        let wheel = store.create_element("Wheel").unwrap();
        store.link(car, wheel, "VehicleWheels").unwrap();
        store.set_property(car, "name", Value::text("kitt")).unwrap();
        store.remove_element(wheel);

        // Element removal tears its edges down silently, so no unlink or
        // disowned events follow the deleting notification.
        assert!(!store.unlink(car, wheel, "VehicleWheels").unwrap());
        assert_eq!(*log.0.lock(), vec!["created", "created", "link", "owned", "property", "deleting"]);
    }

    #[test]
    fn test_deleting_observer_can_still_see_links() {
        struct LinkCounter(Mutex<Option<usize>>);

        impl LifecycleHandler for LinkCounter {
            fn handle(&self, event: &LifecycleEvent, store: &InstanceStore) -> anyhow::Result<()> {
                if let LifecycleEvent::InstanceDeleting { element } = event {
                    *self.0.lock() = Some(store.links_for_element(*element).len());
                }
                Ok(())
            }
        }

        let mut store = store();
        let counter = Arc::new(LinkCounter(Mutex::new(None)));
        store.subscribe(crate::events::DEFAULT_PRIORITY, Arc::clone(&counter) as Arc<dyn LifecycleHandler>);

        let car = store.create_element("Car").unwrap();
        let wheel = store.create_element("Wheel").unwrap();
        store.link(car, wheel, "VehicleWheels").unwrap();
        store.remove_element(wheel);
        assert_eq!(*counter.0.lock(), Some(1));
    }

    #[test]
    fn test_owner_and_children_helpers() {
        let mut store = store();
        let car = store.create_element("Car").unwrap();
        let w1 = store.create_element("Wheel").unwrap();
        let w2 = store.create_element("Wheel").unwrap();
        store.link(car, w1, "VehicleWheels").unwrap();
        store.link(car, w2, "VehicleWheels").unwrap();
        assert_eq!(store.owner_of(w1), Some(car));
        assert_eq!(store.owner_of(car), None);
        let children = store.owned_children(car);
        assert_eq!(children.len(), 2);
        assert!(children.contains(&w1) && children.contains(&w2));
    }
}
