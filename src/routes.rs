// src/routes.rs
use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, state::AppState, store::VotingStore};

pub fn create_routes<S: VotingStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/voters", post(handlers::create_voter))
        .route(
            "/api/votings",
            get(handlers::list_votings::<S>).post(handlers::create_voting::<S>),
        )
        .route(
            "/api/votings/{id}",
            get(handlers::get_voting::<S>)
                .patch(handlers::update_voting::<S>)
                .delete(handlers::delete_voting::<S>),
        )
        .route("/api/votings/{id}/end", post(handlers::end_voting::<S>))
        .route("/api/votings/{id}/votes", post(handlers::submit_votes::<S>))
        .route("/api/votings/{id}/stats", get(handlers::voting_stats::<S>))
        .route("/api/votings/{id}/live", get(handlers::live_voting::<S>))
        .with_state(state)
}
