//! Completion detection over the forest
//!
//! A node is complete when it has exited and everything under it, children and exec
//! records alike, is complete too. Whether the run finished or was abandoned is for the
//! caller to decide.

use crate::forest::{Forest, NodeId};

/// Whether `id` and its whole subtree are done. A dangling id is never complete.
pub fn is_complete(forest: &Forest, id: NodeId) -> bool {
    let Some(process) = forest.process(id) else {
        return false;
    };

    process.is_done()
        && process
            .execs
            .iter()
            .all(|exec| forest.exec(*exec).is_some_and(|exec| exec.is_done()))
        && process
            .children
            .iter()
            .all(|child| is_complete(forest, *child))
}

/// Whether every root is complete; vacuously true without roots
pub fn forest_complete(forest: &Forest) -> bool {
    forest.roots().iter().all(|root| is_complete(forest, *root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_leaf_completes_on_exit() {
        let mut forest = Forest::new();
        let root = forest.register_root(100, "build", None, Instant::now());
        assert!(!is_complete(&forest, root));

        forest.mark_process_done(root, Instant::now()).unwrap();
        assert!(is_complete(&forest, root));
        assert!(forest_complete(&forest));
    }

    #[test]
    fn test_pending_child_blocks_parent() {
        let now = Instant::now();
        let mut forest = Forest::new();
        let root = forest.register_root(100, "build", None, now);
        let child = forest.add_child(root, 200, "make", None, now).unwrap();

        forest.mark_process_done(root, now).unwrap();
        assert!(!is_complete(&forest, root));

        forest.mark_process_done(child, now).unwrap();
        assert!(is_complete(&forest, root));
    }

    #[test]
    fn test_pending_exec_blocks_owner() {
        let now = Instant::now();
        let mut forest = Forest::new();
        let root = forest.register_root(100, "build", None, now);
        let exec = forest.add_exec(root, 400, None, now).unwrap();

        forest.mark_process_done(root, now).unwrap();
        assert!(!is_complete(&forest, root));

        forest.mark_exec_done(exec, now).unwrap();
        assert!(is_complete(&forest, root));
    }

    #[test]
    fn test_every_root_must_complete() {
        let now = Instant::now();
        let mut forest = Forest::new();
        assert!(forest_complete(&forest));

        let first = forest.register_root(100, "build", None, now);
        let second = forest.register_root(300, "runc", None, now);
        forest.mark_process_done(first, now).unwrap();
        assert!(!forest_complete(&forest));

        forest.mark_process_done(second, now).unwrap();
        assert!(forest_complete(&forest));
    }
}
