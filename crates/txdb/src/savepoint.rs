//! Savepoint stack for nested transaction emulation

use txdb_core::Savepoint;

/// Ids of the savepoints outstanding on one shared transaction.
///
/// The bottom entry is the implicit base (id 0); it is never created and
/// never rolled back to, so the stack always holds one more entry than there
/// are open nested transactions. Ids come from a counter that only moves
/// forward, so an id is never reused while the shared transaction lives.
#[derive(Debug)]
pub(crate) struct SavepointStack {
    prefix: String,
    ids: Vec<u64>,
    next_id: u64,
}

impl SavepointStack {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ids: vec![0],
            next_id: 1,
        }
    }

    /// Number of open nested transactions
    pub(crate) fn depth(&self) -> usize {
        self.ids.len() - 1
    }

    /// Reserve the next savepoint id without pushing it
    pub(crate) fn allocate(&mut self) -> Savepoint {
        let id = self.next_id;
        self.next_id += 1;
        Savepoint::new(&self.prefix, id)
    }

    pub(crate) fn push(&mut self, savepoint: &Savepoint) {
        self.ids.push(savepoint.id());
    }

    /// Pop the innermost savepoint. Returns `None` when only the base is left.
    pub(crate) fn pop(&mut self) -> Option<Savepoint> {
        if self.ids.len() <= 1 {
            return None;
        }
        self.ids.pop().map(|id| Savepoint::new(&self.prefix, id))
    }

    /// Pop every savepoint down to and including `id`. Returns `None`, leaving
    /// the stack untouched, when `id` is no longer on it.
    pub(crate) fn pop_through(&mut self, id: u64) -> Option<Savepoint> {
        if id == 0 {
            return None;
        }
        let position = self.ids.iter().rposition(|&open| open == id)?;
        self.ids.truncate(position);
        Some(Savepoint::new(&self.prefix, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_entry_is_never_popped() {
        let mut stack = SavepointStack::new("txdb");
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_push_pop_order() {
        let mut stack = SavepointStack::new("txdb");
        let first = stack.allocate();
        stack.push(&first);
        let second = stack.allocate();
        stack.push(&second);

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().map(|sp| sp.name().to_string()), Some("txdb_2".into()));
        assert_eq!(stack.pop().map(|sp| sp.name().to_string()), Some("txdb_1".into()));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut stack = SavepointStack::new("sp");
        let first = stack.allocate();
        stack.push(&first);
        stack.pop();

        // an allocation that never got pushed still consumes its id
        let _abandoned = stack.allocate();
        let next = stack.allocate();
        assert_eq!(next.id(), 3);
        assert_eq!(next.name(), "sp_3");
    }

    #[test]
    fn test_pop_through_drops_inner_levels() {
        let mut stack = SavepointStack::new("txdb");
        let outer = stack.allocate();
        stack.push(&outer);
        let inner = stack.allocate();
        stack.push(&inner);

        assert_eq!(stack.pop_through(outer.id()), Some(outer.clone()));
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.pop_through(outer.id()), None);
        assert_eq!(stack.pop_through(inner.id()), None);
        assert_eq!(stack.pop_through(0), None);
    }
}
