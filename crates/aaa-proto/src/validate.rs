//! Stream validation.
//!
//! A well-formed stream announces every node before referencing it, and every
//! parent before its children. The root id is implicitly announced per file.

use crate::{Message, ProtoError, ROOT_ID, Result, uid};
use std::collections::HashSet;

/// Incrementally checks that a message stream can be replayed into a tree.
#[derive(Debug, Default)]
pub struct StreamValidator {
    announced: HashSet<String>,
}

impl StreamValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks one message in arrival order.
    pub fn observe(&mut self, file_id: &str, msg: &Message) -> Result<()> {
        match msg {
            Message::Added { id, test } => {
                let node = uid(file_id, *id);
                if test.parent_id != ROOT_ID && !self.announced.contains(&uid(file_id, test.parent_id)) {
                    return Err(ProtoError::OrphanAdded {
                        uid: node,
                        parent: uid(file_id, test.parent_id),
                    });
                }
                if !self.announced.insert(node.clone()) {
                    return Err(ProtoError::DuplicateNode { uid: node });
                }
                Ok(())
            }
            Message::Start { id } => self.require("Start", file_id, *id),
            Message::End { id, .. } => self.require("End", file_id, *id),
            Message::FileStart | Message::FileEnd | Message::Coverage { .. } => Ok(()),
        }
    }

    /// Number of distinct nodes announced so far.
    pub fn len(&self) -> usize {
        self.announced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.announced.is_empty()
    }

    fn require(&self, kind: &'static str, file_id: &str, id: u64) -> Result<()> {
        let node = uid(file_id, id);
        if self.announced.contains(&node) {
            Ok(())
        } else {
            Err(ProtoError::UnknownNode { kind, uid: node })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestKind;

    #[test]
    fn test_accepts_well_formed_stream() {
        let mut validator = StreamValidator::new();
        let stream = [
            Message::added(1, ROOT_ID, "describe", TestKind::Describe),
            Message::Start { id: 1 },
            Message::added(2, 1, "test", TestKind::Test),
            Message::Start { id: 2 },
            Message::end(2, None),
            Message::end(1, None),
        ];
        for msg in &stream {
            validator.observe("", msg).unwrap();
        }
        assert_eq!(validator.len(), 2);
    }

    #[test]
    fn test_rejects_orphans() {
        let mut validator = StreamValidator::new();
        let err = validator
            .observe("", &Message::added(5, 4, "lost", TestKind::Test))
            .unwrap_err();
        assert!(matches!(err, ProtoError::OrphanAdded { .. }));

        let err = validator.observe("", &Message::Start { id: 9 }).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownNode { kind: "Start", .. }));
    }

    #[test]
    fn test_ids_are_scoped_per_file() {
        let mut validator = StreamValidator::new();
        validator
            .observe("a", &Message::added(1, ROOT_ID, "t", TestKind::Test))
            .unwrap();
        validator
            .observe("b", &Message::added(1, ROOT_ID, "t", TestKind::Test))
            .unwrap();
        assert!(validator.observe("c", &Message::end(1, None)).is_err());
    }
}
