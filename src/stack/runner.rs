//! Stack runner.
//!
//! Executes entries in order on the current task:
//!
//! - command: issue (sequence number = execution number), then wait until
//!   the advancement acknowledgment reaches an accepting status, then wait
//!   the settle time
//! - verify: wait `delay`, then re-test on every live-value change until
//!   the condition holds or `delay + timeout` elapses
//! - check: snapshot the checked parameters
//! - text: nothing to do
//!
//! Any failure stops the run: every entry stops executing and pending
//! comparison statuses become cancelled. A `StopHandle` stops the run from
//! another task.

use mdb_types::CommandHistoryEntry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::client::{CommandClient, IssueCommandRequest, Subscription};
use crate::config::StackConfig;
use crate::error::RunnerError;
use crate::feed::ParameterSnapshot;
use crate::stack::advancement::{decide, effective_advancement, AckDecision, AdvancementParams};
use crate::stack::entry::{StackedEntry, Step};
use crate::stack::record::CommandHistoryRecord;

/// Stack-level advancement and the status sets that gate command steps
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerPolicy {
    pub stack_advancement: AdvancementParams,
    pub accepting: Vec<String>,
    pub stopping: Vec<String>,
}

impl RunnerPolicy {
    /// Policy for a document; its advancement overrides the configured default
    pub fn new(config: &StackConfig, document: Option<&AdvancementParams>) -> Self {
        Self {
            stack_advancement: document
                .cloned()
                .unwrap_or_else(|| config.default_advancement.clone()),
            accepting: config.accepting_ack_statuses.clone(),
            stopping: config.stopping_ack_statuses.clone(),
        }
    }
}

impl Default for RunnerPolicy {
    fn default() -> Self {
        Self::new(&StackConfig::default(), None)
    }
}

/// Stops a running stack from another task
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

pub struct StackRunner {
    client: Arc<dyn CommandClient>,
    values: watch::Receiver<ParameterSnapshot>,
    history: Subscription<CommandHistoryEntry>,
    records: HashMap<String, CommandHistoryRecord>,
    policy: RunnerPolicy,
    execution_counter: u64,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

async fn until_stopped<F: Future>(stop: &mut watch::Receiver<bool>, fut: F) -> Result<F::Output, RunnerError> {
    tokio::select! {
        biased;
        _ = stop.wait_for(|stopped| *stopped) => Err(RunnerError::Cancelled),
        out = fut => Ok(out),
    }
}

impl StackRunner {
    pub fn new(
        client: Arc<dyn CommandClient>,
        values: watch::Receiver<ParameterSnapshot>,
        history: Subscription<CommandHistoryEntry>,
        policy: RunnerPolicy,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            client,
            values,
            history,
            records: HashMap::new(),
            policy,
            execution_counter: 0,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop_tx.clone())
    }

    pub fn execution_counter(&self) -> u64 {
        self.execution_counter
    }

    pub fn policy(&self) -> &RunnerPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: RunnerPolicy) {
        self.policy = policy;
    }

    /// Reset every entry and restart execution numbering
    pub fn clear_outputs(&mut self, entries: &mut [StackedEntry]) {
        for entry in entries.iter_mut() {
            entry.clear_outputs();
        }
        self.execution_counter = 0;
        self.records.clear();
    }

    /// Run a single entry without advancing
    pub async fn run_entry(&mut self, entry: &mut StackedEntry) -> Result<(), RunnerError> {
        self.run_from(std::slice::from_mut(entry), 0).await.map(|_| ())
    }

    /// Run entries from `start` to the end; returns how many were executed.
    ///
    /// On failure or stop the run is stopped and the error returned; the
    /// failing entry carries the error text in `state.err`.
    pub async fn run_from(&mut self, entries: &mut [StackedEntry], start: usize) -> Result<usize, RunnerError> {
        self.stop_tx.send_replace(false);
        let mut executed = 0;

        for idx in start..entries.len() {
            let result = match self.execute(&mut entries[idx]).await {
                Ok(delay_ms) if delay_ms > 0 => {
                    debug!("Waiting {}ms before next entry", delay_ms);
                    until_stopped(&mut self.stop_rx, sleep(Duration::from_millis(delay_ms))).await
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };
            executed += 1;

            if let Err(e) = result {
                warn!(entry = idx, "Stack run stopped: {}", e);
                Self::stop_run(entries);
                return Err(e);
            }
            entries[idx].state.executing = false;
        }

        info!("Stack run completed ({} entries)", executed);
        Ok(executed)
    }

    /// Clear `executing` everywhere and cancel pending comparisons
    pub fn stop_run(entries: &mut [StackedEntry]) {
        for entry in entries.iter_mut() {
            entry.cancel();
        }
    }

    fn absorb(&mut self, update: CommandHistoryEntry) {
        match self.records.get_mut(&update.id) {
            Some(record) => record.merge(&update),
            None => {
                self.records
                    .insert(update.id.clone(), CommandHistoryRecord::from_entry(&update));
            }
        }
    }

    /// Execute one entry; returns the delay before the next entry may start
    async fn execute(&mut self, entry: &mut StackedEntry) -> Result<u64, RunnerError> {
        self.execution_counter += 1;
        let n = self.execution_counter;
        entry.clear_outputs();
        let label = entry.to_string();

        let StackedEntry { comment, step, state } = entry;
        match step {
            Step::Command(command) => {
                let request = IssueCommandRequest {
                    sequence_number: Some(n),
                    args: command.args.clone(),
                    extra: command.extra.clone(),
                    comment: comment.clone(),
                    stream: command.stream.clone(),
                };
                let issued = until_stopped(
                    &mut self.stop_rx,
                    self.client.issue_command(&command.command_id(), request),
                )
                .await?;
                state.execution_number = Some(n);

                let response = match issued {
                    Ok(response) => response,
                    Err(e) => {
                        let err = RunnerError::Dispatch(e.to_string());
                        state.err = Some(e.to_string());
                        return Err(err);
                    }
                };
                info!(execution = n, id = %response.id, "Sending command {}", label);
                state.executing = true;
                command.id = Some(response.id.clone());

                let policy = effective_advancement(command.advancement.as_ref(), &self.policy.stack_advancement);
                loop {
                    if let Some(record) = self.records.get(&response.id) {
                        command.record = Some(record.clone());
                        match decide(record, &policy, &self.policy.accepting, &self.policy.stopping) {
                            AckDecision::Continue { delay_ms } => return Ok(delay_ms),
                            AckDecision::Stop { status } => {
                                let err = RunnerError::Rejected {
                                    acknowledgment: policy.acknowledgment.clone().unwrap_or_default(),
                                    status,
                                };
                                state.err = Some(err.to_string());
                                return Err(err);
                            }
                            AckDecision::Wait => {}
                        }
                    }
                    match until_stopped(&mut self.stop_rx, self.history.recv()).await? {
                        Some(update) => self.absorb(update),
                        None => {
                            state.err = Some(RunnerError::FeedClosed.to_string());
                            return Err(RunnerError::FeedClosed);
                        }
                    }
                }
            }
            Step::Verify(verify) => {
                state.execution_number = Some(n);
                state.executing = true;
                info!(execution = n, "Verifying {}", label);

                // A deadline past the clock's range is no deadline at all
                let started = Instant::now();
                let deadline = verify
                    .timeout
                    .filter(|t| *t > 0)
                    .and_then(|t| verify.delay.checked_add(t))
                    .and_then(|ms| started.checked_add(Duration::from_millis(ms)));
                if verify.delay > 0 {
                    until_stopped(&mut self.stop_rx, sleep(Duration::from_millis(verify.delay))).await?;
                }

                let mut values = self.values.clone();
                loop {
                    let snapshot = values.borrow_and_update().clone();
                    if verify.test(&*snapshot) {
                        debug!(execution = n, "Verification passed");
                        return Ok(0);
                    }

                    let woke = match deadline {
                        Some(deadline) => {
                            until_stopped(&mut self.stop_rx, timeout_at(deadline, values.changed())).await?
                        }
                        None => {
                            until_stopped(&mut self.stop_rx, async {
                                Ok::<_, tokio::time::error::Elapsed>(values.changed().await)
                            })
                            .await?
                        }
                    };
                    match woke {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) => {
                            state.err = Some(RunnerError::FeedClosed.to_string());
                            return Err(RunnerError::FeedClosed);
                        }
                        Err(_) => {
                            state.err = Some(RunnerError::Timeout.to_string());
                            return Err(RunnerError::Timeout);
                        }
                    }
                }
            }
            Step::Check(check) => {
                let snapshot = self.values.borrow().clone();
                check.test(&*snapshot);
                state.execution_number = Some(n);
                debug!(execution = n, "Checked {}", label);
                Ok(0)
            }
            Step::Text(_) => {
                state.execution_number = Some(n);
                Ok(0)
            }
        }
    }
}
