//! Database façade
//!
//! Owns the runner (and with it the engine state), the observer registry,
//! and the open/upgrade lifecycle. Builders obtained here freeze into
//! contexts and hand them back; everything runs as tasks through the
//! runner. On open the engine hydrates cache and indices from the back
//! store, recovers the row-id allocator from the largest stored key, and
//! runs the upgrade hook when the stored schema version is older than the
//! declared one.

use crate::backstore::{BackStore, StoreTx, TxMode};
use crate::builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
use crate::cache::RowCache;
use crate::context::{Projection, QueryContext};
use crate::errors::{EngineError, EngineResult};
use crate::executor::{ResultRow, StatementResult};
use crate::index::IndexRegistry;
use crate::observability::{Logger, Severity};
use crate::observe::{ObserverRegistry, Subscriber, SubscriptionId};
use crate::planner::QueryPlanner;
use crate::row::{Row, RowIdAllocator};
use crate::runner::{EngineCore, Runner, TaskOutcome};
use crate::schema::DatabaseSchema;

/// Called when the stored schema version is older than the declared one.
/// Receives the stored version and a raw store transaction scoped to every
/// declared table.
pub type UpgradeHook = Box<dyn FnMut(u32, &mut dyn StoreTx) -> EngineResult<()> + Send>;

/// An atomic multi-statement transaction
pub struct Transaction {
    contexts: Vec<QueryContext>,
    executed: bool,
}

impl Transaction {
    /// An empty transaction
    pub fn new() -> Self {
        Self {
            contexts: Vec::new(),
            executed: false,
        }
    }

    /// Append a statement
    pub fn push(&mut self, ctx: QueryContext) {
        self.contexts.push(ctx);
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// An open database
pub struct Database {
    runner: Runner,
    observers: ObserverRegistry,
    open: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("open", &self.open).finish()
    }
}

impl Database {
    /// Open a database over a back store.
    ///
    /// When the store carries an older schema version the upgrade hook runs
    /// exactly once inside its own transaction before the engine comes up;
    /// a store with a newer version than declared is refused.
    pub fn open(
        schema: DatabaseSchema,
        mut store: Box<dyn BackStore>,
        mut on_upgrade: Option<UpgradeHook>,
    ) -> EngineResult<Self> {
        schema.validate_structure().map_err(EngineError::Syntax)?;
        store.open(&schema)?;

        let scope: Vec<String> = schema.tables.iter().map(|t| t.name.clone()).collect();
        match store.stored_version()? {
            Some(stored) if stored > schema.version => {
                return Err(EngineError::NotSupported(format!(
                    "Store holds schema version {} newer than declared {}",
                    stored, schema.version
                )));
            }
            Some(stored) if stored < schema.version => {
                if let Some(hook) = on_upgrade.as_mut() {
                    let mut tx = store.begin(TxMode::ReadWrite, &scope)?;
                    match hook(stored, tx.as_mut()) {
                        Ok(()) => tx.commit()?,
                        Err(e) => {
                            tx.abort();
                            return Err(e);
                        }
                    }
                }
                store.set_version(schema.version)?;
                Logger::log(
                    Severity::Info,
                    "schema_upgraded",
                    &[("to", &schema.version.to_string())],
                );
            }
            Some(_) => {}
            None => store.set_version(schema.version)?,
        }

        // Hydrate cache and indices; recover the row-id allocator from the
        // largest stored key across all tables
        let mut cache = RowCache::new();
        let mut registry = IndexRegistry::from_schema(&schema);
        let allocator = RowIdAllocator::new();
        {
            let tx = store.begin(TxMode::ReadOnly, &scope)?;
            for table in &schema.tables {
                if let Some(max) = tx.max_key(&table.name)? {
                    allocator.bump_past(max);
                }
                for (row_id, payload) in tx.scan(&table.name)? {
                    let row: Row = serde_json::from_slice(&payload).map_err(|e| {
                        EngineError::CorruptData {
                            table: table.name.clone(),
                            row_id,
                            message: e.to_string(),
                        }
                    })?;
                    registry.add_row(&table.name, &row)?;
                    cache.put(&table.name, row);
                }
            }
            tx.abort();
        }

        Ok(Self {
            runner: Runner::new(EngineCore {
                schema,
                store,
                cache,
                registry,
                allocator,
                commit_version: 0,
            }),
            observers: ObserverRegistry::new(),
            open: true,
        })
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(EngineError::Uninitialized)
        }
    }

    /// Close the store; every later call fails with UNINITIALIZED
    pub fn close(&mut self) {
        self.runner.core_mut().store.close();
        self.open = false;
    }

    /// The declared schema
    pub fn schema(&self) -> &DatabaseSchema {
        &self.runner.core().schema
    }

    /// Commit counter, bumped once per read-write commit
    pub fn commit_version(&self) -> u64 {
        self.runner.core().commit_version
    }

    /// Start a SELECT; empty projections mean every column
    pub fn select(&mut self, projections: Vec<Projection>) -> SelectBuilder<'_> {
        SelectBuilder::new(self, projections)
    }

    /// Start an INSERT
    pub fn insert(&mut self) -> InsertBuilder<'_> {
        InsertBuilder::new(self, false)
    }

    /// Start an INSERT that replaces rows sharing a primary key
    pub fn insert_or_replace(&mut self) -> InsertBuilder<'_> {
        InsertBuilder::new(self, true)
    }

    /// Start an UPDATE of one table
    pub fn update(&mut self, table: &str) -> UpdateBuilder<'_> {
        UpdateBuilder::new(self, table)
    }

    /// Start a DELETE
    pub fn delete(&mut self) -> DeleteBuilder<'_> {
        DeleteBuilder::new(self)
    }

    /// Subscribe to a SELECT context; the callback fires whenever the
    /// query's result set changes
    pub fn observe(
        &mut self,
        ctx: &QueryContext,
        subscriber: Subscriber,
    ) -> EngineResult<SubscriptionId> {
        self.ensure_open()?;
        self.observers.observe(ctx, subscriber)
    }

    /// Remove one subscriber of an observed query
    pub fn unobserve(&mut self, ctx: &QueryContext, id: &SubscriptionId) -> bool {
        self.observers.unobserve(ctx, id)
    }

    /// Run an atomic multi-statement transaction. A transaction executes at
    /// most once; running it again is an error.
    pub fn execute_transaction(
        &mut self,
        tx: &mut Transaction,
    ) -> EngineResult<Vec<StatementResult>> {
        if tx.executed {
            return Err(EngineError::Transaction(
                "Transaction already executed".into(),
            ));
        }
        tx.executed = true;
        let outcome = self.run_contexts(tx.contexts.clone())?;
        Ok(outcome.results)
    }

    /// Render the plan chosen for a SELECT context
    pub fn explain(&self, ctx: &QueryContext) -> EngineResult<String> {
        self.ensure_open()?;
        let core = self.runner.core();
        let planner = QueryPlanner::new(&core.schema, &core.registry, &core.cache);
        Ok(planner.plan_select(ctx)?.explain())
    }

    /// Run statements as one task; after a mutating commit the observer
    /// registry re-evaluates affected queries
    pub(crate) fn run_contexts(
        &mut self,
        contexts: Vec<QueryContext>,
    ) -> EngineResult<TaskOutcome> {
        self.ensure_open()?;
        let outcome = self.runner.run_now(contexts)?;
        if !outcome.mutated.is_empty() {
            self.observers
                .on_commit(&mut self.runner, &outcome.mutated, outcome.commit_version);
        }
        Ok(outcome)
    }

    /// Run one SELECT and feed its results to the observer registry
    pub(crate) fn run_select(
        &mut self,
        template_fingerprint: u64,
        ctx: QueryContext,
    ) -> EngineResult<Vec<ResultRow>> {
        let outcome = self.run_contexts(vec![ctx.clone()])?;
        let rows = match outcome.results.into_iter().next() {
            Some(StatementResult::Rows(rows)) => rows,
            _ => Vec::new(),
        };
        self.observers.on_select_executed(
            template_fingerprint,
            &ctx,
            &rows,
            outcome.commit_version,
        );
        Ok(rows)
    }

    /// Run one write statement, returning the affected row count
    pub(crate) fn run_write(&mut self, ctx: QueryContext) -> EngineResult<usize> {
        let outcome = self.run_contexts(vec![ctx])?;
        Ok(outcome
            .results
            .first()
            .map(StatementResult::affected)
            .unwrap_or(0))
    }
}
