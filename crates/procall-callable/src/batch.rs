//! Batched execution of queued procedure calls

use crate::call::ProcedureCall;
use crate::coordinator::ExecutionCoordinator;
use procall_core::{BatchAbortError, ProcallError, Result};

/// Progress of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// FIFO queue of call descriptors executed one after another on a single
/// prepared handle
#[derive(Debug, Default)]
pub struct BatchExecutor {
    queue: Vec<ProcedureCall>,
    state: BatchState,
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a deep copy of `call`. Later changes to `call` do not reach the
    /// queued entry.
    pub fn add(&mut self, call: &ProcedureCall) -> Result<()> {
        call.check_parameters()?;
        self.queue.push(call.clone());
        self.state = BatchState::Idle;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.state = BatchState::Idle;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Queued descriptors in execution order
    pub fn queued(&self) -> &[ProcedureCall] {
        &self.queue
    }

    /// Run every queued call and return their update counts.
    ///
    /// The run stops at the first failing call with a `BatchAbort` carrying
    /// the counts of the calls completed so far. The queue is empty afterwards
    /// whatever the outcome, and the coordinator's own descriptor is active
    /// again.
    #[tracing::instrument(skip(self, coordinator), fields(statement = %coordinator.id(), queued = self.queue.len()))]
    pub fn execute(&mut self, coordinator: &mut ExecutionCoordinator) -> Result<Vec<i64>> {
        let entries = std::mem::take(&mut self.queue);
        coordinator.ensure_open()?;
        if entries.is_empty() {
            self.state = BatchState::Completed;
            return Ok(Vec::new());
        }

        let lock = coordinator.lock().clone();
        let _guard = lock.acquire();
        // The previous result completes before the batch starts
        coordinator.reset_results()?;
        self.state = BatchState::Running;

        let connection = coordinator.connection().clone();
        connection.notify_statement_started();

        let send_out_params = !coordinator.is_selectable();
        let live_call = coordinator.swap_call(entries[0].clone());
        let outcome = run_entries(coordinator, entries, send_out_params);
        coordinator.swap_call(live_call);

        match outcome {
            Ok(counts) => {
                self.state = BatchState::Completed;
                connection.notify_statement_completed(true);
                tracing::debug!(executed = counts.len(), "batch completed");
                Ok(counts)
            }
            Err(abort) => {
                self.state = BatchState::Failed;
                connection.notify_statement_completed(false);
                tracing::warn!(
                    completed = abort.completed_counts().len(),
                    sql_state = %abort.sql_state(),
                    error = %abort.cause(),
                    "batch aborted"
                );
                Err(ProcallError::BatchAbort(abort))
            }
        }
    }
}

fn run_entries(
    coordinator: &mut ExecutionCoordinator,
    entries: Vec<ProcedureCall>,
    send_out_params: bool,
) -> std::result::Result<Vec<i64>, BatchAbortError> {
    let mut counts = Vec::with_capacity(entries.len());
    if let Err(e) = coordinator.prepare_if_needed() {
        return Err(BatchAbortError::new(e, counts));
    }
    for entry in entries {
        coordinator.swap_call(entry);
        match coordinator.execute_batch_entry(send_out_params) {
            Ok(false) => counts.push(coordinator.update_count().max(0)),
            Ok(true) => {
                return Err(BatchAbortError::new(
                    ProcallError::UnexpectedResultInBatch,
                    counts,
                ));
            }
            Err(e) => return Err(BatchAbortError::new(e, counts)),
        }
    }
    Ok(counts)
}
