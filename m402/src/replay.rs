//! Anti-replay record of consumed proof signatures.
//!
//! Every signature accepted by the ledger is claimed here before the tool
//! runs. A claimed signature is never released: it stays bound to the call id
//! that claimed it, so the same proof cannot unlock a second call. Successful
//! results are cached against the signature for a bounded window so that a
//! re-sent duplicate (same id, same proof) gets the original result instead
//! of running the tool again.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::BoxFuture;
use crate::call::CallId;
use crate::tool::ToolResult;

/// Default window during which a successful result is replayed to duplicates.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(600);

/// State of a consumed signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofState {
    /// The owning call is running the tool.
    Executing,
    /// The tool succeeded; the result is still cached.
    Completed(ToolResult),
    /// The signature is consumed but no result is available, either because
    /// the tool failed or because the cache window elapsed.
    Spent,
}

/// Who consumed a signature, and how far that call got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRecord {
    /// The call that claimed the signature.
    pub call_id: CallId,
    /// Progress of that call.
    pub state: ProofState,
}

/// Result of [`ReplayStore::check_and_set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the signature and must run the tool, then call
    /// [`ReplayStore::complete`].
    Acquired,
    /// The signature is held; the record says by whom and in what state.
    Held(ProofRecord),
}

/// Storage for consumed signatures.
///
/// Implementations must make [`check_and_set`](Self::check_and_set) atomic:
/// of several concurrent claims for one signature, exactly one is
/// [`Claim::Acquired`].
pub trait ReplayStore: Send + Sync {
    /// Returns the record for `signature`, if it was consumed.
    fn lookup<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, Option<ProofRecord>>;

    /// Claims `signature` for `call_id`.
    ///
    /// A signature is acquired if it was never consumed, or if it was
    /// consumed by the same `call_id` and is [`ProofState::Spent`]. Otherwise
    /// the current record is returned.
    fn check_and_set<'a>(&'a self, signature: &'a str, call_id: &'a CallId)
    -> BoxFuture<'a, Claim>;

    /// Finishes a claimed signature: caches `result` on success, or marks it
    /// spent when `result` is `None`.
    fn complete<'a>(&'a self, signature: &'a str, result: Option<ToolResult>) -> BoxFuture<'a, ()>;
}

#[derive(Debug)]
enum SlotState {
    Executing,
    Completed { result: ToolResult, at: Instant },
    Spent,
}

#[derive(Debug)]
struct Slot {
    call_id: CallId,
    state: SlotState,
}

/// Process-local [`ReplayStore`] backed by a [`DashMap`].
///
/// The per-key entry lock of the map is the mutual-exclusion boundary around
/// check-and-insert.
#[derive(Debug)]
pub struct InMemoryReplayStore {
    slots: DashMap<String, Slot>,
    result_ttl: Duration,
}

impl Default for InMemoryReplayStore {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_TTL)
    }
}

impl InMemoryReplayStore {
    /// Creates a store that caches successful results for `result_ttl`.
    #[must_use]
    pub fn new(result_ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            result_ttl,
        }
    }

    /// Returns the result cache window.
    #[must_use]
    pub const fn result_ttl(&self) -> Duration {
        self.result_ttl
    }

    /// Returns `true` if `signature` has been consumed.
    #[must_use]
    pub fn is_consumed(&self, signature: &str) -> bool {
        self.slots.contains_key(signature)
    }

    /// Number of consumed signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no signature has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops cached results older than the cache window.
    ///
    /// Signatures stay consumed; only the results are released. Returns the
    /// number of results dropped.
    pub fn evict_expired_results(&self) -> usize {
        let mut evicted = 0;
        for mut slot in self.slots.iter_mut() {
            if self.is_expired(&slot.state) {
                slot.state = SlotState::Spent;
                evicted += 1;
            }
        }
        evicted
    }

    fn is_expired(&self, state: &SlotState) -> bool {
        matches!(state, SlotState::Completed { at, .. } if at.elapsed() >= self.result_ttl)
    }

    fn snapshot(&self, slot: &Slot) -> ProofRecord {
        let state = match &slot.state {
            SlotState::Executing => ProofState::Executing,
            SlotState::Completed { result, at } if at.elapsed() < self.result_ttl => {
                ProofState::Completed(result.clone())
            }
            SlotState::Completed { .. } | SlotState::Spent => ProofState::Spent,
        };
        ProofRecord {
            call_id: slot.call_id.clone(),
            state,
        }
    }

    fn claim(&self, signature: &str, call_id: &CallId) -> Claim {
        match self.slots.entry(signature.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    call_id: call_id.clone(),
                    state: SlotState::Executing,
                });
                Claim::Acquired
            }
            Entry::Occupied(mut occupied) => {
                let record = self.snapshot(occupied.get());
                if record.call_id == *call_id && record.state == ProofState::Spent {
                    occupied.get_mut().state = SlotState::Executing;
                    Claim::Acquired
                } else {
                    Claim::Held(record)
                }
            }
        }
    }

    fn finish(&self, signature: &str, result: Option<ToolResult>) {
        if let Some(mut slot) = self.slots.get_mut(signature) {
            slot.state = match result {
                Some(result) => SlotState::Completed {
                    result,
                    at: Instant::now(),
                },
                None => SlotState::Spent,
            };
        }
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn lookup<'a>(&'a self, signature: &'a str) -> BoxFuture<'a, Option<ProofRecord>> {
        let record = self.slots.get(signature).map(|slot| self.snapshot(&slot));
        Box::pin(async move { record })
    }

    fn check_and_set<'a>(
        &'a self,
        signature: &'a str,
        call_id: &'a CallId,
    ) -> BoxFuture<'a, Claim> {
        let claim = self.claim(signature, call_id);
        Box::pin(async move { claim })
    }

    fn complete<'a>(&'a self, signature: &'a str, result: Option<ToolResult>) -> BoxFuture<'a, ()> {
        self.finish(signature, result);
        Box::pin(async {})
    }
}
