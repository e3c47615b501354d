//! Observer registry
//!
//! Maps live SELECT queries to their subscribers. Queries collapse by
//! structural identity: a query observed before binding is recognised when
//! its bound form executes, and the latest bound form is what commits
//! re-run. Entries hold their subscribers; queries never reference entries,
//! so there is no cycle to break. An entry with no subscribers is evicted.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use uuid::Uuid;

use crate::context::{QueryContext, QueryKind};
use crate::errors::{EngineError, EngineResult};
use crate::executor::{ResultRow, StatementResult};
use crate::observability::{Logger, Severity};
use crate::runner::Runner;

use super::diff::{diff, ChangeEvent};

/// Handle identifying one subscriber
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Subscriber callback
pub type Subscriber = Box<dyn FnMut(&ChangeEvent) + Send>;

struct Entry {
    /// Latest runnable (fully bound) form of the query
    bound: Option<QueryContext>,
    /// Fingerprint of the bound form, recognised on later execs
    bound_fingerprint: Option<u64>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    last_version: u64,
    last_results: Vec<ResultRow>,
}

/// Registry of observed queries
#[derive(Default)]
pub struct ObserverRegistry {
    /// Keyed by the fingerprint the query was observed under
    entries: HashMap<u64, Entry>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for a SELECT context
    pub fn observe(
        &mut self,
        ctx: &QueryContext,
        subscriber: Subscriber,
    ) -> EngineResult<SubscriptionId> {
        if ctx.kind != QueryKind::Select {
            return Err(EngineError::Syntax("Only SELECT queries are observable".into()));
        }
        let id = SubscriptionId::new();
        let entry = self.entries.entry(ctx.fingerprint()).or_insert_with(|| Entry {
            bound: ctx.is_resolved().then(|| ctx.clone()),
            bound_fingerprint: None,
            subscribers: Vec::new(),
            last_version: 0,
            last_results: Vec::new(),
        });
        entry.subscribers.push((id.clone(), subscriber));
        Ok(id)
    }

    /// Drop one subscriber of a query; the entry goes with its last
    /// subscriber
    pub fn unobserve(&mut self, ctx: &QueryContext, id: &SubscriptionId) -> bool {
        let fingerprint = ctx.fingerprint();
        let Some(key) = self.resolve_key(fingerprint) else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        let before = entry.subscribers.len();
        entry.subscribers.retain(|(sub_id, _)| sub_id != id);
        let removed = entry.subscribers.len() < before;
        if entry.subscribers.is_empty() {
            self.entries.remove(&key);
        }
        removed
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is observed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Called after a SELECT executed: when the query (or the template it
    /// was bound from) is observed, adopt the bound form, store the
    /// results, and notify on change.
    pub fn on_select_executed(
        &mut self,
        template_fingerprint: u64,
        executed: &QueryContext,
        results: &[ResultRow],
        commit_version: u64,
    ) {
        let executed_fingerprint = executed.fingerprint();
        let key = match self.resolve_key(executed_fingerprint) {
            Some(key) => Some(key),
            None => self.resolve_key(template_fingerprint),
        };
        let Some(entry) = key.and_then(|key| self.entries.get_mut(&key)) else {
            return;
        };
        entry.bound = Some(executed.clone());
        entry.bound_fingerprint = Some(executed_fingerprint);

        let event = diff(&entry.last_results, results);
        entry.last_results = results.to_vec();
        entry.last_version = commit_version;
        if !event.is_empty() {
            Self::notify(&mut entry.subscribers, &event);
        }
    }

    /// Called after a commit mutated `mutated`: re-run every affected
    /// observed query as a read-only task and notify subscribers whose
    /// results changed.
    pub fn on_commit(&mut self, runner: &mut Runner, mutated: &[String], commit_version: u64) {
        for entry in self.entries.values_mut() {
            let Some(bound) = entry.bound.clone() else {
                continue;
            };
            if entry.last_version >= commit_version {
                continue;
            }
            let intersects = bound.from.iter().any(|t| mutated.contains(t))
                || bound.scope().iter().any(|t| mutated.contains(t));
            if !intersects {
                continue;
            }

            let results = match runner.run_now(vec![bound]) {
                Ok(outcome) => match outcome.results.into_iter().next() {
                    Some(StatementResult::Rows(rows)) => rows,
                    _ => Vec::new(),
                },
                Err(e) => {
                    Logger::log_stderr(
                        Severity::Error,
                        "observer_requery_failed",
                        &[("error", &e.to_string())],
                    );
                    continue;
                }
            };

            let event = diff(&entry.last_results, &results);
            entry.last_results = results;
            entry.last_version = commit_version;
            if !event.is_empty() {
                Self::notify(&mut entry.subscribers, &event);
            }
        }
    }

    /// Find the entry key a fingerprint refers to: the observed key itself
    /// or the bound form adopted later
    fn resolve_key(&self, fingerprint: u64) -> Option<u64> {
        if self.entries.contains_key(&fingerprint) {
            return Some(fingerprint);
        }
        self.entries
            .iter()
            .find(|(_, e)| e.bound_fingerprint == Some(fingerprint))
            .map(|(key, _)| *key)
    }

    /// Invoke subscribers; a panicking callback is logged and isolated,
    /// it never poisons the commit pipeline
    fn notify(subscribers: &mut [(SubscriptionId, Subscriber)], event: &ChangeEvent) {
        for (_, subscriber) in subscribers.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber(event)));
            if outcome.is_err() {
                Logger::log_stderr(
                    Severity::Error,
                    "observer_callback_panicked",
                    &[("added", &event.added.len().to_string())],
                );
            }
        }
    }
}
