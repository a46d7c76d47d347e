//! Identity types and the id registry
//!
//! Every entity is constructed with [`Identifier::unassigned`] and receives its
//! real id exactly once, when it is registered into a world (or when a saved
//! world is rehydrated under its original ids).

use crate::{Error, IdRng, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

const UNASSIGNED: &str = "UNKNOWN";
const SUFFIX_LEN: usize = 9;

/// Unique, immutable identifier of an object, variable or force field
///
/// Ids are plain strings such as `VAR_3K9QZ0T1A` so they can be pasted into
/// expressions and grepped in saved worlds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier from raw text
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The placeholder carried by entities that are not registered yet
    pub fn unassigned() -> Self {
        Self(UNASSIGNED.to_string())
    }

    /// Check if this is the placeholder id
    pub fn is_unassigned(&self) -> bool {
        self.0 == UNASSIGNED
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::unassigned()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Entity-kind prefix of a generated id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    Object,
    Variable,
    ForceField,
    DerivedForceField,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Object => "OBJ",
            IdPrefix::Variable => "VAR",
            IdPrefix::ForceField => "FF",
            IdPrefix::DerivedForceField => "FFD",
        }
    }
}

/// An entity that carries a write-once identifier
pub trait Identified {
    /// Current id (possibly the placeholder)
    fn id(&self) -> &Identifier;

    /// Mutable slot backing [`Identified::id`]
    #[doc(hidden)]
    fn id_slot(&mut self) -> &mut Identifier;

    /// Give the entity its permanent id
    ///
    /// Fails with `IdentityViolation` if a real id is already set.
    fn assign_id(&mut self, id: Identifier) -> Result<()> {
        let slot = self.id_slot();
        if !slot.is_unassigned() {
            return Err(Error::IdentityViolation {
                current: slot.to_string(),
                attempted: id.to_string(),
            });
        }
        *slot = id;
        Ok(())
    }
}

/// Issues unique identifiers and remembers every id in use
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdRegistry {
    used: IndexSet<Identifier>,
    rng: IdRng,
}

impl IdRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with a specific suffix seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            used: IndexSet::new(),
            rng: IdRng::new(seed),
        }
    }

    /// Current state of the suffix generator
    ///
    /// A registry created with this as its seed draws the same suffixes this
    /// one would draw next.
    pub fn rng_state(&self) -> u64 {
        self.rng.state()
    }

    /// Generate a fresh `<PREFIX>_<SUFFIX>` id and mark it used
    ///
    /// Suffixes are redrawn until they do not collide with any used id.
    pub fn generate_id(&mut self, prefix: IdPrefix) -> Identifier {
        loop {
            let candidate =
                Identifier(format!("{}_{}", prefix.as_str(), self.rng.base36(SUFFIX_LEN)));
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Mark a caller-chosen id as used
    ///
    /// Used when rehydrating saved worlds so cross-references survive.
    pub fn reserve(&mut self, id: &Identifier) -> Result<()> {
        if id.is_unassigned() {
            return Err(Error::InvalidOperation(
                "cannot reserve the unassigned placeholder".to_string(),
            ));
        }
        if !self.used.insert(id.clone()) {
            return Err(Error::IdentityViolation {
                current: id.to_string(),
                attempted: id.to_string(),
            });
        }
        Ok(())
    }

    /// Forget an id whose entity has been removed
    pub fn release(&mut self, id: &Identifier) -> bool {
        self.used.shift_remove(id)
    }

    /// Check if an id is in use
    pub fn contains(&self, id: &Identifier) -> bool {
        self.used.contains(id)
    }

    /// Number of ids in use
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Check if no ids are in use
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
