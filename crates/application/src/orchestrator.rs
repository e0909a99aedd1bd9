//! Runs commands as retried units of work and handles the post-commit steps.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::Actor;
use read_cache::{Cache, CacheInvalidator};
use store::{AggregateStore, EventEnvelope};
use tracing::{info, warn};

use crate::error::{ErrorKind, Result};
use crate::relay::EventRelay;
use crate::retry::{RetryPolicy, with_retry};
use crate::sink::EventSink;
use crate::unit_of_work::UnitOfWork;

/// A request to change state.
///
/// `execute` runs inside a unit of work: it loads what it needs, applies
/// aggregate commands and saves the results. It may be called more than once
/// when a concurrent update forces a retry, so it must not have side effects
/// outside the unit of work.
#[async_trait]
pub trait Command: Send + Sync + std::fmt::Debug {
    type Output: Send;

    /// Name used in logs and metrics.
    const NAME: &'static str;

    fn actor(&self) -> &Actor;

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Self::Output>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<T> {
    /// The command's output, usually the aggregate after the change.
    pub aggregate: T,

    /// The events that were committed, in the order they were raised.
    pub events: Vec<EventEnvelope>,
}

impl<T> CommandResult<T> {
    pub fn event_types(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.event_type.as_str()).collect()
    }
}

/// Sequences every command through begin, execute, commit, publish and
/// invalidate. Any error before commit rolls the unit of work back and nothing
/// is published.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn AggregateStore>,
    relay: EventRelay,
    invalidator: CacheInvalidator,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        sink: Arc<dyn EventSink>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            relay: EventRelay::new(store.clone(), sink),
            invalidator: CacheInvalidator::new(cache),
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn AggregateStore> {
        &self.store
    }

    pub fn relay(&self) -> &EventRelay {
        &self.relay
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn begin(&self, actor: &Actor) -> Result<UnitOfWork> {
        let tx = self.store.begin().await?;
        Ok(UnitOfWork::new(tx, actor.clone()))
    }

    /// Executes a command, retrying the whole unit of work on conflicts.
    pub async fn dispatch<C: Command>(&self, cmd: &C) -> Result<CommandResult<C::Output>> {
        let started = Instant::now();
        let result = with_retry(&self.retry, C::NAME, move || async move {
            let mut uow = self.begin(cmd.actor()).await?;
            let outcome = cmd.execute(&mut uow).await;
            self.finish(uow, outcome).await
        })
        .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => match e.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::Rejected => "rejected",
                ErrorKind::Invalid => "invalid",
                ErrorKind::RetryLater => "retry_later",
                ErrorKind::Fault => "fault",
            },
        };
        metrics::counter!("commands_total", "command" => C::NAME, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("command_duration_seconds", "command" => C::NAME)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(r) => info!(command = C::NAME, events = r.events.len(), "Command completed"),
            Err(e) if e.kind() == ErrorKind::Fault => {
                tracing::error!(command = C::NAME, error = %e, "Command failed")
            }
            Err(e) => warn!(command = C::NAME, kind = ?e.kind(), error = %e, "Command refused"),
        }
        result
    }

    /// Commits on success and runs the post-commit steps; rolls back on failure.
    pub async fn finish<T>(&self, uow: UnitOfWork, outcome: Result<T>) -> Result<CommandResult<T>> {
        let aggregate = match outcome {
            Ok(value) => value,
            Err(e) => {
                uow.rollback().await;
                return Err(e);
            }
        };

        let committed = uow.commit().await?;
        self.relay.publish_committed(&committed.events).await;
        self.invalidator.invalidate(&committed.cache_keys).await;

        Ok(CommandResult {
            aggregate,
            events: committed.events,
        })
    }
}
