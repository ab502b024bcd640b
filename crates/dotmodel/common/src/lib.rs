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

//! Shared primitives for the dotModel engine
//!
//! This crate holds the identifier newtypes and the tagged value type that
//! every other dotModel crate builds on. Elements never hold direct
//! references to each other; all cross-element structure is expressed
//! through ids, which keeps the object graph free of aliasing lifetimes.

pub mod id;
pub mod value;

pub use id::{ElementId, IdError, LinkId};
pub use value::{Cardinality, ScalarValue, Value};
