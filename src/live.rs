// src/live.rs
use std::{future::pending, time::Duration};

use futures::{stream, Stream};
use tokio::{select, sync::broadcast::error::RecvError, time::sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    feed::Subscription,
    identity::Viewer,
    services::{VotingService, VotingView},
    store::VotingStore,
};

struct LiveState<S> {
    service: VotingService<S>,
    voting_id: Uuid,
    viewer: Viewer,
    subscription: Subscription,
    last: Option<VotingView>,
    primed: bool,
}

enum Wake {
    Changed,
    Gone,
}

/// Views of one voting for one viewer, re-read from the store on every
/// change notification or when the end time passes. Consecutive identical
/// views are emitted once. Dropping the stream unsubscribes.
pub fn watch_voting<S: VotingStore>(
    service: VotingService<S>,
    voting_id: Uuid,
    viewer: Viewer,
) -> impl Stream<Item = VotingView> + Send {
    // subscribe before the first read so nothing between them is missed
    let subscription = service.subscribe(voting_id);

    let state = LiveState {
        service,
        voting_id,
        viewer,
        subscription,
        last: None,
        primed: false,
    };

    stream::unfold(state, |mut state| async move {
        let view = state.next_view().await?;
        Some((view, state))
    })
}

impl<S: VotingStore> LiveState<S> {
    async fn next_view(&mut self) -> Option<VotingView> {
        loop {
            if self.primed {
                if let Wake::Gone = self.wait_for_change().await {
                    debug!(voting_id = %self.voting_id, "Live view closed");
                    return None;
                }
            }
            self.primed = true;

            match self.service.voting_view(self.voting_id, &self.viewer).await {
                Ok(view) if self.last.as_ref() == Some(&view) => continue,
                Ok(view) => {
                    self.last = Some(view.clone());
                    return Some(view);
                }
                Err(AppError::NotFound) => return None,
                Err(err) => {
                    // transient; the next change triggers another read
                    warn!(voting_id = %self.voting_id, "Live view refresh failed: {err}");
                }
            }
        }
    }

    async fn wait_for_change(&mut self) -> Wake {
        let until_end = self.last.as_ref().and_then(|view| {
            if view.is_ended {
                return None;
            }
            // already past: wake right away and re-read
            Some(
                (view.voting.end_at - self.service.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO),
            )
        });

        select! {
            event = self.subscription.recv() => match event {
                Ok(event) if event.is_voting_deleted() => Wake::Gone,
                Ok(_) => Wake::Changed,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(voting_id = %self.voting_id, skipped, "Live view lagged, re-reading");
                    Wake::Changed
                }
                Err(RecvError::Closed) => Wake::Gone,
            },
            _ = async {
                match until_end {
                    Some(duration) => sleep(duration).await,
                    None => pending::<()>().await,
                }
            } => Wake::Changed,
        }
    }
}
