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

//! Identifier newtypes
//!
//! Elements and links are keyed by uuid-backed ids. Ids are generated once
//! at creation time and are immutable thereafter. `Ord` is derived so that
//! bulk operations (index construction, resolution fallbacks) can iterate
//! in a deterministic order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors from id parsing
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("Invalid id string: {0}")]
    InvalidFormat(String),
}

/// Unique identifier for an element in the instance store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Generate a fresh element id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an element id from its string form
    pub fn from_string(s: &str) -> Result<Self, IdError> {
        Uuid::parse_str(s).map(Self).map_err(|_| IdError::InvalidFormat(s.to_string()))
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a link in the link graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Generate a fresh link id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a link id from its string form
    pub fn from_string(s: &str) -> Result<Self, IdError> {
        Uuid::parse_str(s).map(Self).map_err(|_| IdError::InvalidFormat(s.to_string()))
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
