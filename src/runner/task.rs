//! Tasks
//!
//! A task is one unit of serialisable work: one or more query contexts run
//! atomically inside a single back-store transaction. Tasks advertise a
//! table scope and a mode; the runner admits them so that writers never
//! overlap anything sharing a table.

use crate::backstore::TxMode;
use crate::context::QueryContext;
use crate::executor::StatementResult;

/// Task identifier, unique per runner
pub type TaskId = u64;

/// A queued unit of work
#[derive(Debug)]
pub struct Task {
    /// Runner-assigned id
    pub id: TaskId,
    /// Tables the task reads or writes
    pub scope: Vec<String>,
    /// Read-only or read-write
    pub mode: TxMode,
    /// Statements to run atomically, in order
    pub contexts: Vec<QueryContext>,
}

impl Task {
    /// Build a task from its statements; mode and scope derive from them
    pub fn new(id: TaskId, contexts: Vec<QueryContext>) -> Self {
        let mut scope: Vec<String> = Vec::new();
        let mut mode = TxMode::ReadOnly;
        for ctx in &contexts {
            if ctx.is_write() {
                mode = TxMode::ReadWrite;
            }
            for table in ctx.scope() {
                if !scope.contains(&table) {
                    scope.push(table);
                }
            }
        }
        Self {
            id,
            scope,
            mode,
            contexts,
        }
    }

    /// Whether this task may run beside the given running tasks.
    ///
    /// A task is admissible iff its scope does not intersect the scope of
    /// any running read-write task, and, when it writes itself, no running
    /// task shares a table with it.
    pub fn admissible(&self, running: &[(Vec<String>, TxMode)]) -> bool {
        for (scope, mode) in running {
            let overlaps = self.scope.iter().any(|t| scope.contains(t));
            if !overlaps {
                continue;
            }
            if *mode == TxMode::ReadWrite || self.mode == TxMode::ReadWrite {
                return false;
            }
        }
        true
    }
}

/// What a finished task produced
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// One result per statement, in statement order
    pub results: Vec<StatementResult>,
    /// Tables the task mutated; empty for read-only tasks
    pub mutated: Vec<String>,
    /// Commit version after the task, unchanged for read-only tasks
    pub commit_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{QueryContext, QueryKind};

    fn select_on(table: &str) -> QueryContext {
        let mut ctx = QueryContext::new(QueryKind::Select);
        ctx.from = vec![table.to_string()];
        ctx
    }

    fn insert_on(table: &str) -> QueryContext {
        let mut ctx = QueryContext::new(QueryKind::Insert);
        ctx.from = vec![table.to_string()];
        ctx
    }

    #[test]
    fn test_mode_and_scope_derived() {
        let task = Task::new(1, vec![select_on("a"), insert_on("b")]);
        assert_eq!(task.mode, TxMode::ReadWrite);
        assert_eq!(task.scope, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_readers_with_disjoint_scopes_admitted() {
        let task = Task::new(1, vec![select_on("a")]);
        let running = vec![(vec!["b".to_string()], TxMode::ReadOnly)];
        assert!(task.admissible(&running));
    }

    #[test]
    fn test_readers_sharing_tables_admitted() {
        let task = Task::new(1, vec![select_on("a")]);
        let running = vec![(vec!["a".to_string()], TxMode::ReadOnly)];
        assert!(task.admissible(&running));
    }

    #[test]
    fn test_writer_blocks_overlapping_reader() {
        let task = Task::new(1, vec![select_on("a")]);
        let running = vec![(vec!["a".to_string()], TxMode::ReadWrite)];
        assert!(!task.admissible(&running));
    }

    #[test]
    fn test_writer_blocked_by_overlapping_reader() {
        let task = Task::new(1, vec![insert_on("a")]);
        let running = vec![(vec!["a".to_string()], TxMode::ReadOnly)];
        assert!(!task.admissible(&running));
    }

    #[test]
    fn test_disjoint_writer_admitted() {
        let task = Task::new(1, vec![insert_on("a")]);
        let running = vec![(vec!["b".to_string()], TxMode::ReadWrite)];
        assert!(task.admissible(&running));
    }
}
