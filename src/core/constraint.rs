//! Column constraints.
//!
//! Constraints are plain tags held in a small bit set per column. Traversal
//! and SQL synthesis only ever ask membership questions about them.

use crate::core::value::Value;

/// A declarative tag on a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// Part of the row identity. Never written by insert.
    PrimaryKey,
    /// Column rejects NULL.
    NotNull,
    /// Store assigns increasing values.
    Autoincrement,
    /// Values must be distinct across rows.
    Unique,
    /// Column carries a default literal.
    Default,
}

impl Constraint {
    const fn bit(self) -> u8 {
        match self {
            Self::PrimaryKey => 1,
            Self::NotNull => 1 << 1,
            Self::Autoincrement => 1 << 2,
            Self::Unique => 1 << 3,
            Self::Default => 1 << 4,
        }
    }
}

/// The constraint set of one column.
///
/// Fixed once the owning column is built. Adding a tag twice has no
/// additional effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    bits: u8,
    default: Option<Value>,
}

impl Constraints {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, constraint: Constraint) {
        self.bits |= constraint.bit();
    }

    pub(crate) fn set_default(&mut self, value: Value) {
        self.insert(Constraint::Default);
        self.default = Some(value);
    }

    /// Returns true if `constraint` is in the set.
    #[must_use]
    pub const fn has(&self, constraint: Constraint) -> bool {
        self.bits & constraint.bit() != 0
    }

    /// Returns true if every listed constraint is in the set.
    ///
    /// An empty list is trivially satisfied.
    #[must_use]
    pub fn has_all(&self, constraints: &[Constraint]) -> bool {
        constraints.iter().all(|c| self.has(*c))
    }

    /// Default literal, if the column declares one.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns true if no constraint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl FromIterator<Constraint> for Constraints {
    fn from_iter<I: IntoIterator<Item = Constraint>>(iter: I) -> Self {
        let mut set = Self::new();
        for constraint in iter {
            set.insert(constraint);
        }
        set
    }
}
