//! Read-only lookup table replicated on every server.
//!
//! Each server builds its own copy at startup from the same deterministic
//! rule, so all copies are identical without any coordination.

/// Value returned for keys outside the table.
///
/// A miss is not an error: servers always answer, and the client sees the
/// sentinel in the response value.
pub const MISS: i32 = -1;

/// Dense table for keys `0..size` using the identity rule `key -> key`.
///
/// Never mutated after [`LookupTable::build`], so shared references can be
/// read from any task without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    values: Vec<i32>,
}

impl LookupTable {
    pub fn build(size: usize) -> Self {
        let values = (0..size)
            .map(|key| i32::try_from(key).unwrap_or(i32::MAX))
            .collect();
        Self { values }
    }

    /// Returns the mapped value, or [`MISS`] for negative or out-of-range keys.
    pub fn get(&self, key: i32) -> i32 {
        usize::try_from(key)
            .ok()
            .and_then(|index| self.values.get(index))
            .copied()
            .unwrap_or(MISS)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
