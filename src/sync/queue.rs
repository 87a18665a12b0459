//! Queue of operations deferred while offline.
//!
//! Insertion order is replay order. Operations are never merged or
//! deduplicated; two writes to the same target both replay. Removal is by id
//! because the live queue can grow while a drain works from its snapshot.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::types::{HttpMethod, NetworkRequest};

/// Default number of retries after the first failure.
pub const MAX_RETRIES: u32 = 3;

/// What a queued operation does. Each kind maps to exactly one HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    /// A read deferred while offline; its result lands in the cache.
    Read,
}

impl OperationKind {
    pub fn method(&self) -> HttpMethod {
        match self {
            OperationKind::Create => HttpMethod::Post,
            OperationKind::Update => HttpMethod::Put,
            OperationKind::Delete => HttpMethod::Delete,
            OperationKind::Read => HttpMethod::Get,
        }
    }

    pub fn from_method(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => OperationKind::Create,
            HttpMethod::Put => OperationKind::Update,
            HttpMethod::Delete => OperationKind::Delete,
            HttpMethod::Get => OperationKind::Read,
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            "read" => Ok(OperationKind::Read),
            other => Err(format!("unknown operation kind: {}", other)),
        }
    }
}

/// A single deferred request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    pub id: String,
    pub kind: OperationKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub enqueued_at: DateTime<Utc>,
    /// Failed executions so far.
    #[serde(default)]
    pub attempts: u32,
    /// Earliest time the next attempt may run (set after a failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

impl QueuedOperation {
    pub fn new(
        kind: OperationKind,
        target: &str,
        payload: Option<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        // Deletes and reads never carry a body.
        let payload = match kind {
            OperationKind::Create | OperationKind::Update => payload,
            OperationKind::Delete | OperationKind::Read => None,
        };
        Self {
            id: generate_id(now),
            kind,
            target: target.to_string(),
            payload,
            enqueued_at: now,
            attempts: 0,
            retry_at: None,
        }
    }

    pub fn to_request(&self) -> NetworkRequest {
        NetworkRequest {
            method: self.kind.method(),
            target: self.target.clone(),
            body: self.payload.clone(),
        }
    }

    /// Whether backoff allows an attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_at.map(|at| at <= now).unwrap_or(true)
    }
}

/// `<unix millis>-<8 hex chars>`.
pub fn generate_id(now: DateTime<Utc>) -> String {
    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("{}-{}", now.timestamp_millis(), hex::encode(suffix))
}

/// Retry ceiling and exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Operations are dropped once `attempts` exceeds this.
    pub max_retries: u32,
    /// Delay before retry n is `backoff_base * 2^n`. Zero retries on the next pass.
    pub backoff_base: std::time::Duration,
    /// When false, 4xx responses (other than 408/429) are dropped immediately.
    pub retry_client_errors: bool,
}

impl RetryPolicy {
    /// `backoff_base * 2^attempts`, clamped to the largest representable delay.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.min(16));
        Duration::from_std(self.backoff_base.saturating_mul(factor))
            .unwrap_or_else(|_| Duration::max_value())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_base: std::time::Duration::from_secs(1),
            retry_client_errors: false,
        }
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Still queued; next attempt not before `retry_at`.
    Retry { attempts: u32, retry_at: DateTime<Utc> },
    /// Ceiling exceeded; removed from the queue.
    Dropped(QueuedOperation),
    /// Id no longer in the queue (cleared mid-drain).
    Missing,
}

/// FIFO queue of deferred operations.
#[derive(Debug, Default)]
pub struct OperationQueue {
    ops: Vec<QueuedOperation>,
    policy: RetryPolicy,
}

impl OperationQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            ops: Vec::new(),
            policy,
        }
    }

    /// Restore a queue from persisted operations, keeping their order.
    pub fn from_operations(ops: Vec<QueuedOperation>, policy: RetryPolicy) -> Self {
        Self { ops, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Add an operation to the back of the queue.
    pub fn enqueue(&mut self, op: QueuedOperation) {
        self.ops.push(op);
    }

    /// Copy of the current contents, in order.
    pub fn snapshot(&self) -> Vec<QueuedOperation> {
        self.ops.clone()
    }

    pub fn operations(&self) -> &[QueuedOperation] {
        &self.ops
    }

    /// Remove by id. Returns the removed operation.
    pub fn remove(&mut self, id: &str) -> Option<QueuedOperation> {
        let pos = self.ops.iter().position(|op| op.id == id)?;
        Some(self.ops.remove(pos))
    }

    /// Count a failed attempt for `id`, dropping it past the ceiling.
    pub fn record_failure(&mut self, id: &str, now: DateTime<Utc>) -> FailureOutcome {
        let Some(pos) = self.ops.iter().position(|op| op.id == id) else {
            return FailureOutcome::Missing;
        };

        let op = &mut self.ops[pos];
        op.attempts += 1;
        if op.attempts > self.policy.max_retries {
            return FailureOutcome::Dropped(self.ops.remove(pos));
        }

        let retry_at = now
            .checked_add_signed(self.policy.delay_for(op.attempts))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        op.retry_at = Some(retry_at);
        FailureOutcome::Retry {
            attempts: op.attempts,
            retry_at,
        }
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Number of operations currently in the queue.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Serialize for durable storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.ops)
    }

    /// Parse what [`OperationQueue::to_json`] produced.
    pub fn parse_operations(json: &str) -> Result<Vec<QueuedOperation>, serde_json::Error> {
        serde_json::from_str(json)
    }
}
