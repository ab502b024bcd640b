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

//! External evaluation boundaries
//!
//! Derived attributes, derived association ends, constraints, and
//! operation bodies are computed by expression-language implementations
//! that live outside this engine. The engine hands them the expression
//! text and a narrow read/navigate/invoke view of the store; it never
//! inspects the text itself.
//!
//! Evaluators are registered per language tag. A missing evaluator for a
//! required language is a soft failure: callers log a warning and degrade
//! to "no value".

use crate::model::{Element, StoreResult};
use dotmodel_common::{ElementId, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Failure reported by an expression evaluator
#[derive(Debug, thiserror::Error)]
#[error("Evaluation failed: {0}")]
pub struct EvalError(pub String);

/// Read/navigate/invoke view of the store exposed to evaluators
///
/// Narrower than the full instance store so evaluator implementations do
/// not depend on engine internals.
pub trait EngineAccessor {
    fn instance(&self, id: ElementId) -> Option<&Element>;
    fn linked_targets(&self, id: ElementId, association: &str) -> Vec<ElementId>;
    fn linked_sources(&self, id: ElementId, association: &str) -> Vec<ElementId>;
    fn property(&self, id: ElementId, name: &str) -> StoreResult<Option<Value>>;
    fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool;
    fn invoke(&self, id: ElementId, operation: &str, args: &[Value]) -> StoreResult<Option<Value>>;
}

/// An external expression-language implementation
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        expression: &str,
        context: ElementId,
        accessor: &dyn EngineAccessor,
        args: &[Value],
    ) -> Result<Value, EvalError>;
}

/// Evaluators keyed by language tag
#[derive(Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn ExpressionEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an evaluator for a language tag, replacing any previous one
    pub fn register(&mut self, language: impl Into<String>, evaluator: Arc<dyn ExpressionEvaluator>) {
        self.evaluators.insert(language.into(), evaluator);
    }

    pub fn get(&self, language: &str) -> Option<&Arc<dyn ExpressionEvaluator>> {
        self.evaluators.get(language)
    }
}

/// A failed constraint check from `validate_all`
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub element: ElementId,
    pub class_name: String,
    pub constraint: String,
    pub message: String,
}
