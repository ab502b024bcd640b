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

//! Metamodel registry
//!
//! Write-once catalog of class and association definitions. Registration
//! happens at startup; `build_indexes` then computes, in one shot, the
//! transitive superclass lists, an O(1) subclass truth table, the
//! redefinition/subsetting reverse indexes, the per-class applicable
//! association ends (inherited included), and the ownership roles derived
//! from class ownership bindings. After the build the registry is
//! effectively immutable and safe for unsynchronized concurrent reads.

use super::{
    BASE_CLASS, Diagnostic, DiagnosticKind, EndSide, MetaAssociation, MetaAttribute, MetaClass, MetaConstraint,
    MetaOperation, SchemaError, SchemaResult,
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Structural role an association plays in the ownership chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipRole {
    /// Owner → intermediate edges (the owner-side end name)
    OwnerToIntermediate,
    /// Intermediate → child edges (the child-side end name)
    IntermediateToChild,
}

/// Reference to one end of a registered association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndRef {
    pub association: String,
    pub side: EndSide,
}

/// An association end applicable to a class, as seen from that class
///
/// `end` names the side whose end name is usable as a property of the
/// class; `is_target_side` is true when the class sits on the source side
/// and navigates toward targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAssociationEnd {
    pub association: String,
    pub end: EndSide,
    pub is_target_side: bool,
}

/// The metamodel registry
#[derive(Debug, Default)]
pub struct MetamodelRegistry {
    classes: HashMap<String, MetaClass>,
    associations: HashMap<String, MetaAssociation>,
    indexes_built: bool,

    // Precomputed by build_indexes
    all_superclasses: HashMap<String, Vec<String>>,
    subclass_table: HashMap<String, HashSet<String>>,
    redefining: HashMap<String, Vec<EndRef>>,
    subsetting: HashMap<String, Vec<EndRef>>,
    class_ends: HashMap<String, Vec<ClassAssociationEnd>>,
    ownership_roles: HashMap<String, OwnershipRole>,
}

impl MetamodelRegistry {
    /// Create a registry with the synthetic base class pre-registered
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.classes.insert(BASE_CLASS.to_string(), MetaClass::abstract_class(BASE_CLASS));
        registry
    }

    /// Register a class definition
    ///
    /// A class declaring no superclasses is rewritten here, at registration
    /// time, to inherit from the synthetic base class.
    pub fn register_class(&mut self, mut class: MetaClass) -> SchemaResult<()> {
        if self.indexes_built {
            return Err(SchemaError::RegistrationClosed);
        }
        if self.classes.contains_key(&class.name) {
            return Err(SchemaError::DuplicateClass(class.name));
        }
        if class.superclasses.is_empty() && class.name != BASE_CLASS {
            class.superclasses.push(BASE_CLASS.to_string());
        }
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    /// Register an association definition
    pub fn register_association(&mut self, association: MetaAssociation) -> SchemaResult<()> {
        if self.indexes_built {
            return Err(SchemaError::RegistrationClosed);
        }
        if self.associations.contains_key(&association.name) {
            return Err(SchemaError::DuplicateAssociation(association.name));
        }
        self.associations.insert(association.name.clone(), association);
        Ok(())
    }

    /// Compute all lookup indices
    ///
    /// One-shot: closes registration. Fails on circular inheritance; a
    /// superclass name with no registered class is skipped here and reported
    /// by [`validate`](Self::validate).
    pub fn build_indexes(&mut self) -> SchemaResult<()> {
        let class_names: Vec<String> = self.classes.keys().cloned().collect();
        for name in &class_names {
            let supers = self.collect_superclasses(name)?;
            let mut table: HashSet<String> = supers.iter().cloned().collect();
            table.insert(name.clone());
            self.all_superclasses.insert(name.clone(), supers);
            self.subclass_table.insert(name.clone(), table);
        }

        // Sorted association order keeps per-class end lists deterministic.
        let mut assoc_names: Vec<&String> = self.associations.keys().collect();
        assoc_names.sort();

        let mut redefining: HashMap<String, Vec<EndRef>> = HashMap::new();
        let mut subsetting: HashMap<String, Vec<EndRef>> = HashMap::new();
        let mut class_ends: HashMap<String, Vec<ClassAssociationEnd>> = HashMap::new();
        let mut ownership_roles = HashMap::new();

        for name in &assoc_names {
            let assoc = &self.associations[name.as_str()];
            for side in [EndSide::Source, EndSide::Target] {
                let end = assoc.end(side);
                for base in &end.redefines {
                    redefining.entry(base.clone()).or_default().push(EndRef {
                        association: assoc.name.clone(),
                        side,
                    });
                }
                for base in &end.subsets {
                    subsetting.entry(base.clone()).or_default().push(EndRef {
                        association: assoc.name.clone(),
                        side,
                    });
                }
            }
        }

        for class_name in self.classes.keys() {
            let table = &self.subclass_table[class_name];
            let mut ends = Vec::new();
            for name in &assoc_names {
                let assoc = &self.associations[name.as_str()];
                if table.contains(&assoc.source.related_type) {
                    ends.push(ClassAssociationEnd {
                        association: assoc.name.clone(),
                        end: EndSide::Target,
                        is_target_side: true,
                    });
                }
                if table.contains(&assoc.target.related_type) {
                    ends.push(ClassAssociationEnd {
                        association: assoc.name.clone(),
                        end: EndSide::Source,
                        is_target_side: false,
                    });
                }
            }
            class_ends.insert(class_name.clone(), ends);
        }

        for class in self.classes.values() {
            let Some(binding) = &class.ownership else { continue };
            for name in &assoc_names {
                let assoc = &self.associations[name.as_str()];
                if assoc.target.name == binding.owner_end {
                    ownership_roles.insert(assoc.name.clone(), OwnershipRole::OwnerToIntermediate);
                } else if assoc.target.name == binding.child_end {
                    ownership_roles.insert(assoc.name.clone(), OwnershipRole::IntermediateToChild);
                }
            }
        }

        self.redefining = redefining;
        self.subsetting = subsetting;
        self.class_ends = class_ends;
        self.ownership_roles = ownership_roles;
        self.indexes_built = true;
        Ok(())
    }

    /// Transitive superclasses of a class, breadth-first (most-derived
    /// first), excluding the class itself. Detects inheritance cycles.
    fn collect_superclasses(&self, class: &str) -> SchemaResult<Vec<String>> {
        let mut result = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(class);
        if let Some(c) = self.classes.get(class) {
            for s in &c.superclasses {
                queue.push_back(s);
            }
        }
        while let Some(current) = queue.pop_front() {
            if current == class {
                return Err(SchemaError::CircularInheritance(class.to_string()));
            }
            if !seen.insert(current) {
                continue;
            }
            // Dangling superclass names are reported by validate(), not here.
            let Some(c) = self.classes.get(current) else { continue };
            result.push(current.to_string());
            for s in &c.superclasses {
                queue.push_back(s);
            }
        }
        Ok(result)
    }

    pub fn indexes_built(&self) -> bool {
        self.indexes_built
    }

    pub fn class(&self, name: &str) -> Option<&MetaClass> {
        self.classes.get(name)
    }

    pub fn association(&self, name: &str) -> Option<&MetaAssociation> {
        self.associations.get(name)
    }

    /// O(1) subclass test; reflexive and transitive
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        if class == ancestor {
            return true;
        }
        self.subclass_table.get(class).is_some_and(|t| t.contains(ancestor))
    }

    /// All transitive superclasses, most-derived first, excluding the class
    pub fn all_superclasses(&self, class: &str) -> &[String] {
        self.all_superclasses.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Association ends applicable to a class, inherited ones included
    pub fn association_ends_for_class(&self, class: &str) -> &[ClassAssociationEnd] {
        self.class_ends.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ends declared to redefine the given base property name
    pub fn redefining_ends(&self, property: &str) -> &[EndRef] {
        self.redefining.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ends declared to subset the given base property name
    pub fn subsetting_ends(&self, property: &str) -> &[EndRef] {
        self.subsetting.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Structural ownership role of an association, if any
    pub fn ownership_role(&self, association: &str) -> Option<OwnershipRole> {
        self.ownership_roles.get(association).copied()
    }

    /// Find an attribute on a class or its superclasses, most-derived first
    pub fn find_attribute(&self, class: &str, name: &str) -> Option<&MetaAttribute> {
        if let Some(attr) = self.classes.get(class).and_then(|c| c.attribute(name)) {
            return Some(attr);
        }
        for superclass in self.all_superclasses(class) {
            if let Some(attr) = self.classes.get(superclass).and_then(|c| c.attribute(name)) {
                return Some(attr);
            }
        }
        None
    }

    /// All constraints applicable to a class, inherited included
    pub fn constraints_for_class(&self, class: &str) -> Vec<&MetaConstraint> {
        let mut result = Vec::new();
        if let Some(c) = self.classes.get(class) {
            result.extend(c.constraints.iter());
        }
        for superclass in self.all_superclasses(class) {
            if let Some(c) = self.classes.get(superclass) {
                result.extend(c.constraints.iter());
            }
        }
        result
    }

    /// Find an operation on a class or its superclasses, most-derived first
    pub fn find_operation(&self, class: &str, name: &str) -> Option<&MetaOperation> {
        if let Some(op) = self.classes.get(class).and_then(|c| c.operations.iter().find(|o| o.name == name)) {
            return Some(op);
        }
        for superclass in self.all_superclasses(class) {
            if let Some(op) = self.classes.get(superclass).and_then(|c| c.operations.iter().find(|o| o.name == name)) {
                return Some(op);
            }
        }
        None
    }

    /// Report dangling references and inheritance cycles
    ///
    /// Non-fatal: the caller decides what to do with the findings.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut names: Vec<&String> = self.classes.keys().collect();
        names.sort();
        for name in &names {
            let class = &self.classes[name.as_str()];
            for superclass in &class.superclasses {
                if !self.classes.contains_key(superclass) {
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::DanglingSuperclass,
                        subject: class.name.clone(),
                        message: format!("class '{}' inherits from unregistered class '{}'", class.name, superclass),
                    });
                }
            }
            if self.collect_superclasses(name).is_err() {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::CircularInheritance,
                    subject: class.name.clone(),
                    message: format!("class '{}' participates in an inheritance cycle", class.name),
                });
            }
        }
        let mut assoc_names: Vec<&String> = self.associations.keys().collect();
        assoc_names.sort();
        for name in assoc_names {
            let assoc = &self.associations[name];
            for end in [&assoc.source, &assoc.target] {
                if !self.classes.contains_key(&end.related_type) {
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::DanglingEndType,
                        subject: assoc.name.clone(),
                        message: format!(
                            "association '{}' end '{}' relates to unregistered class '{}'",
                            assoc.name, end.name, end.related_type
                        ),
                    });
                }
            }
        }
        diagnostics
    }
}
