// src/state.rs
use crate::{services::VotingService, store::VotingStore};

/// Shared handler state. Cheap to clone: the service only holds handles.
#[derive(Clone)]
pub struct AppState<S> {
    pub service: VotingService<S>,
}

impl<S: VotingStore> AppState<S> {
    pub fn new(service: VotingService<S>) -> Self {
        Self { service }
    }
}
