use serde_derive::Serialize;
use std::fmt::{Display, Formatter, Result as DisplayResult};

use crate::instruction::SymbolicId;

/// A branch decision at a symbolized conditional jump.
///
/// `taken` is always the successor that execution actually reached, and
/// `not_taken` the one left to explore.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathConstraint {
    pub pc_id: SymbolicId,
    pub source: u64,
    pub taken: u64,
    pub not_taken: u64,
}

impl PathConstraint {
    pub fn new(pc_id: SymbolicId, source: u64, taken: u64, not_taken: u64) -> Self {
        Self {
            pc_id,
            source,
            taken,
            not_taken,
        }
    }
}

impl Display for PathConstraint {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        write!(
            f,
            "0x{:x}: taken 0x{:x}, not taken 0x{:x} (#{})",
            self.source, self.taken, self.not_taken, self.pc_id
        )
    }
}

/// Ordered, append-only log of path constraints for the current session.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct PathConstraints {
    constraints: Vec<PathConstraint>,
}

impl PathConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: PathConstraint) {
        self.constraints.push(constraint);
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn last(&self) -> Option<&PathConstraint> {
        self.constraints.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathConstraint> {
        self.constraints.iter()
    }

    /// Constraints recorded at `source`, oldest first.
    pub fn at(&self, source: u64) -> impl Iterator<Item = &PathConstraint> {
        self.constraints.iter().filter(move |c| c.source == source)
    }
}
