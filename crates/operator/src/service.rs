//! Operator service: reacts to settlement tasks and votes on their outcome.
//!
//! For every `TaskCreated` event the service:
//! 1. Fetches the bid list of the task's auction
//! 2. Resolves each sealed amount through the oracle, dropping bids that
//!    cannot be resolved after retries
//! 3. Ranks resolved bids and keeps the top `max_winners`
//! 4. Allocates the supply proportionally across winners
//! 5. Computes the commitment over the ordered winner list
//! 6. Submits the response
//! 7. Watches for completion and logs whether its commitment was agreed

use std::collections::BTreeSet;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use auction_module::{ModuleEvent, RespondOutcome};
use auction_types::{compute_winner_commitment, short_hex, Commitment, Task, TaskId, WinnerEntry};

use crate::chain::ChainClient;
use crate::config::OperatorConfig;
use crate::error::{OperatorError, Result};
use crate::ranking::{compute_winner_set, ResolvedBid};
use crate::resolver::BidResolver;

/// A response this operator submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub task_id: TaskId,
    pub commitment: Commitment,
    pub winners: Vec<WinnerEntry>,
    pub outcome: RespondOutcome,
}

/// A submission awaiting task completion.
#[derive(Debug, Clone)]
struct Pending {
    submission: Submission,
    /// Stop checking after this instant
    deadline: Instant,
}

/// The operator pipeline.
pub struct OperatorService<C, R> {
    config: OperatorConfig,
    chain: C,
    resolver: R,
    /// Next event sequence number to read
    cursor: u64,
    /// Submissions whose task has not completed yet
    pending: Vec<Pending>,
    /// Tasks whose processing failed transiently
    retry: BTreeSet<TaskId>,
}

impl<C: ChainClient, R: BidResolver> OperatorService<C, R> {
    /// Create a new operator service.
    pub fn new(config: OperatorConfig, chain: C, resolver: R) -> Self {
        Self {
            config,
            chain,
            resolver,
            cursor: 0,
            pending: Vec::new(),
            retry: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn pending(&self) -> impl Iterator<Item = &Submission> {
        self.pending.iter().map(|p| &p.submission)
    }

    /// Tasks queued for another attempt on the next poll.
    pub fn retrying(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.retry.iter().copied()
    }

    /// Compute the winner set for a task (steps 1 to 4).
    pub async fn compute_winners(&self, task: &Task) -> Result<Vec<WinnerEntry>> {
        let auction = self
            .chain
            .auction(&task.pool_id)
            .await?
            .filter(|a| a.auction_id == task.auction_id)
            .ok_or(OperatorError::AuctionMismatch(task.auction_id))?;

        let bids = self.chain.bids(&task.pool_id).await?;
        let mut resolved = Vec::with_capacity(bids.len());

        for bid in &bids {
            match self.resolve_with_retry(bid.bidder, &bid.encrypted_amount).await {
                Ok(amount) => resolved.push(ResolvedBid {
                    bidder: bid.bidder,
                    amount,
                    timestamp: bid.timestamp,
                }),
                Err(e) => warn!(
                    task_id = task.task_id,
                    bidder = short_hex(&bid.bidder),
                    error = %e,
                    "Excluding unresolved bid"
                ),
            }
        }

        if resolved.len() < bids.len() {
            warn!(
                task_id = task.task_id,
                resolved = resolved.len(),
                total = bids.len(),
                "Proceeding with partial bid set"
            );
        }

        Ok(compute_winner_set(&resolved, auction.min_bid_amount, auction.max_winners))
    }

    async fn resolve_with_retry(
        &self,
        bidder: auction_types::Address,
        handle: &auction_types::EncryptedHandle,
    ) -> Result<u64> {
        let mut attempt = 0;
        loop {
            match self.resolver.resolve(handle, &self.config.address).await {
                Ok(amount) => return Ok(amount),
                Err(e) if attempt < self.config.resolve_retries => {
                    attempt += 1;
                    debug!(bidder = short_hex(&bidder), attempt, error = %e, "Retrying resolution");
                    sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run steps 1 to 6 for a task. Returns `None` if the task has already
    /// completed or this operator already answered it.
    pub async fn process_task(&self, task_id: TaskId) -> Result<Option<Submission>> {
        let task = self
            .chain
            .task(task_id)
            .await?
            .ok_or(OperatorError::TaskNotFound(task_id))?;

        if task.completed {
            debug!(task_id, "Task already completed, skipping");
            return Ok(None);
        }

        if self.chain.has_responded(task_id, &self.config.address).await? {
            debug!(task_id, "Already responded, skipping");
            return Ok(None);
        }

        let winners = self.compute_winners(&task).await?;
        let commitment = compute_winner_commitment(&winners);

        let outcome = self
            .chain
            .respond(&self.config.address, task_id, winners.clone(), commitment)
            .await?;

        info!(
            task_id,
            operator = short_hex(&self.config.address),
            commitment = short_hex(&commitment),
            winners = winners.len(),
            votes = outcome.votes,
            required = outcome.required,
            quorum = outcome.quorum_reached,
            "Submitted response"
        );

        Ok(Some(Submission {
            task_id,
            commitment,
            winners,
            outcome,
        }))
    }

    /// Whether the task completed with `commitment`; `None` while still open.
    pub async fn check_completion(
        &self,
        task_id: TaskId,
        commitment: &Commitment,
    ) -> Result<Option<bool>> {
        let task = self
            .chain
            .task(task_id)
            .await?
            .ok_or(OperatorError::TaskNotFound(task_id))?;

        if !task.completed {
            return Ok(None);
        }

        let matched = task.agreed_commitment.as_ref() == Some(commitment);
        if matched {
            info!(task_id, "Task completed with our commitment");
        } else {
            warn!(
                task_id,
                ours = short_hex(commitment),
                agreed = ?task.agreed_commitment.map(|c| short_hex(&c)),
                "Task completed with a different commitment"
            );
        }
        Ok(Some(matched))
    }

    /// Poll until the task completes (step 7). Fails with `Timeout` after
    /// `completion_timeout`.
    pub async fn await_completion(&self, task_id: TaskId, commitment: &Commitment) -> Result<bool> {
        let deadline = Instant::now() + self.config.completion_timeout;
        loop {
            if let Some(matched) = self.check_completion(task_id, commitment).await? {
                return Ok(matched);
            }
            if Instant::now() >= deadline {
                return Err(OperatorError::Timeout(task_id));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Read new events, handle task notifications and check pending
    /// submissions. Returns the number of tasks responded to.
    ///
    /// A task whose processing fails transiently is kept and re-attempted on
    /// every poll until it is answered, found already answered, or completes.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let events = self
            .chain
            .events(self.cursor, self.config.event_batch)
            .await?;

        let mut tasks: Vec<TaskId> = std::mem::take(&mut self.retry).into_iter().collect();
        for record in events {
            self.cursor = record.seq + 1;
            if let ModuleEvent::TaskCreated { task_id, .. } = record.event {
                tasks.push(task_id);
            }
        }

        let mut responded = 0;
        for task_id in tasks {
            match self.process_task(task_id).await {
                Ok(Some(submission)) => {
                    if !submission.outcome.quorum_reached {
                        self.pending.push(Pending {
                            submission,
                            deadline: Instant::now() + self.config.completion_timeout,
                        });
                    }
                    responded += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(task_id, error = %e, "Failed to process task, will retry");
                    self.retry.insert(task_id);
                }
                Err(e) => warn!(task_id, error = %e, "Failed to process task"),
            }
        }

        let mut still_open = Vec::with_capacity(self.pending.len());
        for entry in std::mem::take(&mut self.pending) {
            let task_id = entry.submission.task_id;
            match self
                .check_completion(task_id, &entry.submission.commitment)
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) if Instant::now() >= entry.deadline => {
                    warn!(task_id, "Task still open after completion timeout, no longer watching");
                }
                Ok(None) => still_open.push(entry),
                Err(e) => {
                    warn!(task_id, error = %e, "Failed to check task");
                    still_open.push(entry);
                }
            }
        }
        self.pending = still_open;

        Ok(responded)
    }

    /// Poll forever.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            operator = short_hex(&self.config.address),
            endpoint = %self.config.rpc_endpoint,
            "Operator watching for tasks"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Poll failed");
            }
            sleep(self.config.poll_interval).await;
        }
    }
}
