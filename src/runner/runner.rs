//! Task runner
//!
//! Owns the engine state and a FIFO task queue. The host is assumed
//! single-threaded, so serialisation is an admission policy rather than a
//! lock protocol: before a task starts, its scope and mode are checked
//! against the running set (`Task::admissible`); conflicting work is
//! requeued and retries once the conflict retires. Admitted tasks run to
//! completion, so work sharing a table executes in enqueue order. A
//! queued task can be cancelled until the drain admits it.
//!
//! Commit pipeline for a read-write task:
//! open store tx → execute statements into the journal → validate
//! constraints → flush journal to the tx → commit tx → apply post-image to
//! indices and cache → bump the commit version.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::backstore::{BackStore, TxMode};
use crate::cache::RowCache;
use crate::context::QueryContext;
use crate::errors::{EngineError, EngineResult};
use crate::executor::QueryExecutor;
use crate::index::IndexRegistry;
use crate::journal::Journal;
use crate::observability::{Logger, Severity};
use crate::row::RowIdAllocator;
use crate::schema::DatabaseSchema;

use super::task::{Task, TaskId, TaskOutcome};

/// Mutable engine state the runner guards
pub struct EngineCore {
    /// Declared schema
    pub schema: DatabaseSchema,
    /// Durable store
    pub store: Box<dyn BackStore>,
    /// Session row cache
    pub cache: RowCache,
    /// All indices
    pub registry: IndexRegistry,
    /// Row-id allocator
    pub allocator: RowIdAllocator,
    /// Monotonic commit counter, bumped once per read-write commit
    pub commit_version: u64,
}

/// FIFO task runner
pub struct Runner {
    core: EngineCore,
    queue: VecDeque<Task>,
    /// Scopes and modes of tasks currently executing
    running: Vec<(Vec<String>, TxMode)>,
    cancelled: HashSet<TaskId>,
    finished: HashMap<TaskId, EngineResult<TaskOutcome>>,
    next_id: TaskId,
}

impl Runner {
    /// Create a runner over the engine state
    pub fn new(core: EngineCore) -> Self {
        Self {
            core,
            queue: VecDeque::new(),
            running: Vec::new(),
            cancelled: HashSet::new(),
            finished: HashMap::new(),
            next_id: 1,
        }
    }

    /// Read access to the engine state
    pub fn core(&self) -> &EngineCore {
        &self.core
    }

    /// Mutable access to the engine state, for open-time hydration
    pub fn core_mut(&mut self) -> &mut EngineCore {
        &mut self.core
    }

    /// Queue a task; it runs when the drain reaches it
    pub fn enqueue(&mut self, contexts: Vec<QueryContext>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back(Task::new(id, contexts));
        id
    }

    /// Cancel a task that has not started. Returns false once the task
    /// already ran (or never existed).
    pub fn cancel(&mut self, task: TaskId) -> bool {
        if self.queue.iter().any(|t| t.id == task) {
            self.cancelled.insert(task);
            true
        } else {
            false
        }
    }

    /// Run queued tasks in enqueue order, subject to admission control
    pub fn drain(&mut self) {
        while let Some(task) = self.queue.pop_front() {
            if self.cancelled.remove(&task.id) {
                self.finished.insert(task.id, Err(EngineError::TaskCancelled));
                continue;
            }
            // A task starts only when no running read-write work shares its
            // scope. Admitted tasks run to completion before the next
            // admission check, so a requeued task retries as soon as the
            // conflicting scope retires.
            if !task.admissible(&self.running) {
                self.queue.push_back(task);
                continue;
            }
            self.running.push((task.scope.clone(), task.mode));
            let outcome = self.run_task(&task);
            self.running.pop();
            self.finished.insert(task.id, outcome);
        }
    }

    /// Take the outcome of a finished task
    pub fn take_outcome(&mut self, task: TaskId) -> Option<EngineResult<TaskOutcome>> {
        self.finished.remove(&task)
    }

    /// Queue, drain, and return one task's outcome in a single step
    pub fn run_now(&mut self, contexts: Vec<QueryContext>) -> EngineResult<TaskOutcome> {
        let id = self.enqueue(contexts);
        self.drain();
        self.take_outcome(id)
            .unwrap_or_else(|| Err(EngineError::Transaction("Task outcome lost".into())))
    }

    fn run_task(&mut self, task: &Task) -> EngineResult<TaskOutcome> {
        for ctx in &task.contexts {
            if !ctx.is_resolved() {
                return Err(EngineError::Syntax(
                    "Query has unbound parameters; call bind first".into(),
                ));
            }
        }

        let mut tx = self.core.store.begin(task.mode, &task.scope)?;
        let mut journal = Journal::new();
        let mut results = Vec::with_capacity(task.contexts.len());

        let executor = QueryExecutor::new(
            &self.core.schema,
            &self.core.registry,
            &self.core.cache,
            &self.core.allocator,
        );
        for ctx in &task.contexts {
            match executor.execute(ctx, &mut journal) {
                Ok(result) => results.push(result),
                Err(e) => {
                    tx.abort();
                    return Err(e);
                }
            }
        }

        if task.mode == TxMode::ReadOnly || journal.is_empty() {
            tx.abort();
            return Ok(TaskOutcome {
                results,
                mutated: Vec::new(),
                commit_version: self.core.commit_version,
            });
        }

        if let Err(e) =
            journal.validate(&self.core.schema, &self.core.cache, &self.core.registry)
        {
            tx.abort();
            return Err(e);
        }

        let mutated = journal.touched_tables();
        if let Err(e) = journal.flush(tx.as_mut()) {
            tx.abort();
            return Err(e);
        }
        tx.commit()?;

        // The post-image lands in indices and cache in one uninterrupted
        // step; concurrent readers never see a torn state
        journal.apply(&mut self.core.cache, &mut self.core.registry)?;
        self.core.commit_version += 1;

        Logger::log(
            Severity::Info,
            "commit",
            &[
                ("version", &self.core.commit_version.to_string()),
                ("tables", &mutated.join(",")),
            ],
        );

        Ok(TaskOutcome {
            results,
            mutated,
            commit_version: self.core.commit_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backstore::MemoryStore;
    use crate::context::{QueryContext, QueryKind};
    use crate::schema::{Column, ColumnType, TableSchema};
    use crate::value::Value;
    use std::collections::HashMap as Map;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            "db",
            1,
            vec![TableSchema::new(
                "movie",
                vec![
                    Column::new("id", ColumnType::Integer),
                    Column::new("year", ColumnType::Integer),
                ],
            )
            .with_primary_key(vec!["id"])],
        )
    }

    fn runner() -> Runner {
        let schema = schema();
        let mut store = MemoryStore::new();
        store.open(&schema).unwrap();
        let registry = IndexRegistry::from_schema(&schema);
        Runner::new(EngineCore {
            schema,
            store: Box::new(store),
            cache: RowCache::new(),
            registry,
            allocator: RowIdAllocator::new(),
            commit_version: 0,
        })
    }

    fn insert_ctx(id: i64, year: i64) -> QueryContext {
        let mut ctx = QueryContext::new(QueryKind::Insert);
        ctx.from = vec!["movie".to_string()];
        let mut payload = Map::new();
        payload.insert("id".to_string(), Value::Integer(id));
        payload.insert("year".to_string(), Value::Integer(year));
        ctx.rows = vec![payload];
        ctx
    }

    fn select_ctx() -> QueryContext {
        let mut ctx = QueryContext::new(QueryKind::Select);
        ctx.from = vec!["movie".to_string()];
        ctx
    }

    #[test]
    fn test_commit_bumps_version_and_reports_scope() {
        let mut r = runner();
        let outcome = r.run_now(vec![insert_ctx(1, 1999)]).unwrap();
        assert_eq!(outcome.commit_version, 1);
        assert_eq!(outcome.mutated, vec!["movie".to_string()]);
        assert_eq!(outcome.results[0].affected(), 1);

        let outcome = r.run_now(vec![select_ctx()]).unwrap();
        assert_eq!(outcome.commit_version, 1);
        assert!(outcome.mutated.is_empty());
        assert_eq!(outcome.results[0].rows().len(), 1);
    }

    #[test]
    fn test_enqueue_order_preserved() {
        let mut r = runner();
        let first = r.enqueue(vec![insert_ctx(1, 1990)]);
        let second = r.enqueue(vec![select_ctx()]);
        r.drain();

        assert!(r.take_outcome(first).unwrap().is_ok());
        let outcome = r.take_outcome(second).unwrap().unwrap();
        // The later select observes the earlier insert
        assert_eq!(outcome.results[0].rows().len(), 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let mut r = runner();
        let id = r.enqueue(vec![insert_ctx(1, 1990)]);
        assert!(r.cancel(id));
        r.drain();

        let err = r.take_outcome(id).unwrap().unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::TaskCancelled);

        // No side effects
        let outcome = r.run_now(vec![select_ctx()]).unwrap();
        assert!(outcome.results[0].rows().is_empty());
    }

    #[test]
    fn test_cancel_after_run_fails() {
        let mut r = runner();
        let id = r.enqueue(vec![insert_ctx(1, 1990)]);
        r.drain();
        assert!(!r.cancel(id));
    }

    #[test]
    fn test_failed_statement_aborts_whole_task() {
        let mut r = runner();
        // Second statement references an unknown table
        let mut bad = QueryContext::new(QueryKind::Insert);
        bad.from = vec!["nope".to_string()];
        bad.rows = vec![Map::new()];

        let err = r.run_now(vec![insert_ctx(1, 1990), bad]).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::NotFound);

        // Nothing from the first statement is visible
        let outcome = r.run_now(vec![select_ctx()]).unwrap();
        assert!(outcome.results[0].rows().is_empty());
    }

    #[test]
    fn test_unbound_parameters_rejected() {
        let mut r = runner();
        let mut ctx = select_ctx();
        ctx.where_clause = Some(crate::predicate::Predicate::eq(
            crate::predicate::ColumnRef::new("movie", "year"),
            crate::predicate::Operand::Slot(0),
        ));
        let err = r.run_now(vec![ctx]).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::Syntax);
    }
}
