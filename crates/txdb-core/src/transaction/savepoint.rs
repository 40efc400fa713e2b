//! Savepoint naming
//!
//! Every nested `begin` on a shared transaction creates a savepoint named
//! `<prefix>_<id>`, where the id is unique for the lifetime of the shared
//! transaction. Rolling back the nested level rolls back to that savepoint.

/// A savepoint within the shared transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    id: u64,
    name: String,
}

impl Savepoint {
    /// Create the savepoint with the given prefix and id.
    ///
    /// The prefix should be a plain SQL identifier, it is not quoted.
    pub fn new(prefix: &str, id: u64) -> Self {
        Self {
            id,
            name: format!("{}_{}", prefix, id),
        }
    }

    /// Get the numeric id of the savepoint.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the name of the savepoint.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL that creates this savepoint.
    pub fn create_sql(&self) -> String {
        format!("SAVEPOINT {}", self.name)
    }

    /// SQL that rolls the transaction back to this savepoint.
    pub fn rollback_sql(&self) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.name)
    }
}

/// Check that a savepoint prefix is a bare identifier that needs no quoting.
pub fn is_valid_savepoint_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
