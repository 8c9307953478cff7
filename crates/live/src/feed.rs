use std::{collections::BTreeMap, future::Future};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One changed row. `columns` holds the row's values rendered as text; for
/// deletes only the columns known at deletion time are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub columns: BTreeMap<String, String>,
}

impl ChangeEvent {
    pub fn new(table: &str, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            table: table.to_string(),
            kind,
            columns: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl ToString) -> ChangeEvent {
        self.columns.insert(column.to_string(), value.to_string());
        self
    }
}

/// Selects the changes to one table whose `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl FeedFilter {
    pub fn new(table: &str, column: &str, value: impl ToString) -> FeedFilter {
        FeedFilter {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && event.columns.get(&self.column) == Some(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("change feed channel error: {0}")]
    Channel(String),
    #[error("change feed subscription timed out")]
    TimedOut,
}

/// An open subscription. Dropping it unsubscribes.
pub trait Subscription: Send {
    /// Waits for the next matching change. `None` means the feed has shut
    /// down and no further changes will arrive.
    fn next(
        &mut self,
    ) -> impl Future<Output = Option<Result<ChangeEvent, FeedError>>> + Send;
}

pub trait ChangeFeed: Send + Sync {
    type Subscription: Subscription;

    fn subscribe(
        &self,
        filter: &FeedFilter,
    ) -> impl Future<Output = Result<Self::Subscription, FeedError>> + Send;
}

/// Fan-out of change events to every subscriber in this process.
#[derive(Clone)]
pub struct BroadcastFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl BroadcastFeed {
    /// `capacity` bounds how far a slow subscriber may fall behind before it
    /// sees a channel error.
    pub fn new(capacity: usize) -> BroadcastFeed {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastFeed { tx }
    }

    /// Returns the number of subscribers the event was handed to.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        tracing::trace!(table = %event.table, kind = ?event.kind, "publishing change");
        // an error only means nobody is listening
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        BroadcastFeed::new(256)
    }
}

pub struct BroadcastSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: FeedFilter,
}

impl Subscription for BroadcastSubscription {
    async fn next(&mut self) -> Option<Result<ChangeEvent, FeedError>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => {
                    return Some(Ok(event))
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    return Some(Err(FeedError::Channel(format!(
                        "subscriber fell behind by {missed} changes"
                    ))))
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl ChangeFeed for BroadcastFeed {
    type Subscription = BroadcastSubscription;

    async fn subscribe(
        &self,
        filter: &FeedFilter,
    ) -> Result<BroadcastSubscription, FeedError> {
        Ok(BroadcastSubscription {
            rx: self.tx.subscribe(),
            filter: filter.clone(),
        })
    }
}
