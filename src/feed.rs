// src/feed.rs
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Vote, Voting, VotingOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRow {
    Voting(Voting),
    Option(VotingOption),
    Vote(Vote),
}

impl ChangeRow {
    pub fn voting_id(&self) -> Uuid {
        match self {
            ChangeRow::Voting(voting) => voting.id,
            ChangeRow::Option(option) => option.voting_id,
            ChangeRow::Vote(vote) => vote.voting_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, row: ChangeRow) -> Self {
        Self { kind, row }
    }

    /// The voting itself is gone; nothing more will happen to it.
    pub fn is_voting_deleted(&self) -> bool {
        self.kind == EventKind::Delete && matches!(self.row, ChangeRow::Voting(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    All,
    Voting(Uuid),
}

impl ChangeFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::Voting(id) => event.row.voting_id() == *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // no subscribers is fine
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(receivers, "Published change event");
    }

    pub fn publish_all(&self, kind: EventKind, rows: impl IntoIterator<Item = ChangeRow>) {
        for row in rows {
            self.publish(ChangeEvent::new(kind, row));
        }
    }

    /// Live subscriptions, filtered or not.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// A filtered receiver. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl Subscription {
    /// Waits for the next matching event.
    ///
    /// `RecvError::Lagged` means events were dropped for this receiver and the
    /// caller should resynchronise from the store.
    pub async fn recv(&mut self) -> Result<ChangeEvent, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
