use crate::libs::error::{FamilyError, Result};
use std::collections::HashSet;

/// Hands out family ids: the smallest positive integer whose decimal form
/// is neither in use nor reserved.
///
/// ```
/// use tfam::libs::family::IdPool;
///
/// let mut pool = IdPool::new(["1", "3"]);
/// pool.reserve(["2"]);
/// assert_eq!(pool.next_id().unwrap(), "4");
/// assert_eq!(pool.next_id().unwrap(), "5");
/// ```
#[derive(Debug, Clone, Default)]
pub struct IdPool {
    taken: HashSet<String>,
    // Ids only get taken, so the answer never moves backwards
    cursor: u64,
}

impl IdPool {
    pub fn new<I, S>(in_use: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taken: in_use.into_iter().map(Into::into).collect(),
            cursor: 1,
        }
    }

    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.taken.extend(names.into_iter().map(Into::into));
    }

    pub fn is_taken(&self, id: &str) -> bool {
        self.taken.contains(id)
    }

    pub fn next_id(&mut self) -> Result<String> {
        while self.cursor <= u32::MAX as u64 {
            let candidate = self.cursor.to_string();
            self.cursor += 1;
            if self.taken.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(FamilyError::IdPoolExhausted)
    }
}
