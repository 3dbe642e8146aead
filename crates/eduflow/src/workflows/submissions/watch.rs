use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;

/// Change token pushed by the store subscription when rows in a filter scope
/// change. `scope_key` matches [`super::repository::SubmissionFilter::scope_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeToken {
    pub scope_key: String,
}

/// One coalesced reload covering every scope touched during the debounce
/// window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub scopes: BTreeSet<String>,
}

/// Debounced consumer of store change tokens. A burst of transitions yields
/// at most one reload per debounce window instead of one reload per event.
#[derive(Debug)]
pub struct ChangeFeed {
    receiver: mpsc::Receiver<ChangeToken>,
    window: Duration,
}

impl ChangeFeed {
    /// Build the feed plus the sender handed to the store subscription.
    pub fn channel(capacity: usize, window: Duration) -> (mpsc::Sender<ChangeToken>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver, window })
    }

    /// Wait for the next burst of change tokens and coalesce it into one
    /// reload request. Returns `None` once every sender is dropped and the
    /// queue has drained.
    pub async fn next_reload(&mut self) -> Option<ReloadRequest> {
        let first = self.receiver.recv().await?;
        let mut scopes = BTreeSet::new();
        scopes.insert(first.scope_key);

        let deadline = tokio::time::sleep(self.window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                token = self.receiver.recv() => match token {
                    Some(token) => {
                        scopes.insert(token.scope_key);
                    }
                    None => break,
                },
            }
        }

        Some(ReloadRequest { scopes })
    }
}

/// Caller-owned advisory cache for list results, keyed by filter scope. The
/// authoritative state lives in the store; every successful mutation must
/// invalidate the scopes it touched.
#[derive(Debug)]
pub struct ListCache<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for ListCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, scope_key: &str) -> Option<&T> {
        self.entries.get(scope_key)
    }

    pub fn put(&mut self, scope_key: impl Into<String>, value: T) {
        self.entries.insert(scope_key.into(), value);
    }

    pub fn invalidate(&mut self, scope_key: &str) {
        self.entries.remove(scope_key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
