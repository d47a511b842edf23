// src/handlers.rs
use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    identity::{CurrentUser, Viewer, VoterIdentity},
    live::watch_voting,
    models::{
        CreateVotingRequest, ListVotingsQuery, SubmitVotesRequest, UpdateVotingRequest, Voting,
        VoterIdentityResponse, VotingDetail, VotingSummary,
    },
    services::{SubmitReceipt, VotingStats, VotingView},
    state::AppState,
    store::VotingStore,
};

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Mints a fresh device identity for a browser that has none stored yet.
pub async fn create_voter() -> (StatusCode, Json<VoterIdentityResponse>) {
    let voter = VoterIdentity::generate();

    (
        StatusCode::CREATED,
        Json(VoterIdentityResponse {
            voter_id: voter.as_str().to_string(),
        }),
    )
}

pub async fn list_votings<S: VotingStore>(
    State(state): State<AppState<S>>,
    QueryParams(query): QueryParams<ListVotingsQuery>,
) -> Result<Json<Vec<VotingSummary>>, AppError> {
    let votings = state.service.list_votings(query.creator).await?;
    Ok(Json(votings))
}

pub async fn create_voting<S: VotingStore>(
    State(state): State<AppState<S>>,
    user: CurrentUser,
    JsonBody(request): JsonBody<CreateVotingRequest>,
) -> Result<(StatusCode, Json<VotingDetail>), AppError> {
    let voting = state.service.create_voting(&user, request).await?;
    Ok((StatusCode::CREATED, Json(voting)))
}

pub async fn get_voting<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    viewer: Viewer,
) -> Result<Json<VotingView>, AppError> {
    let view = state.service.voting_view(voting_id, &viewer).await?;
    Ok(Json(view))
}

pub async fn update_voting<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    user: CurrentUser,
    JsonBody(request): JsonBody<UpdateVotingRequest>,
) -> Result<Json<Voting>, AppError> {
    let voting = state.service.update_voting(voting_id, &user, request).await?;
    Ok(Json(voting))
}

pub async fn end_voting<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    user: CurrentUser,
) -> Result<Json<Voting>, AppError> {
    let voting = state.service.end_voting(voting_id, &user).await?;
    Ok(Json(voting))
}

pub async fn delete_voting<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    state.service.delete_voting(voting_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_votes<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    voter: VoterIdentity,
    JsonBody(request): JsonBody<SubmitVotesRequest>,
) -> Result<(StatusCode, Json<SubmitReceipt>), AppError> {
    let receipt = state
        .service
        .submit_votes(voting_id, &voter, &request.option_ids)
        .await?;

    let status = if receipt.recorded > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(receipt)))
}

pub async fn voting_stats<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    viewer: Viewer,
) -> Result<Json<VotingStats>, AppError> {
    let stats = state.service.voting_stats(voting_id, &viewer).await?;
    Ok(Json(stats))
}

/// Server-sent `voting` events carrying a fresh [`VotingView`] whenever what
/// this viewer may see changes. The stream ends when the voting is deleted.
pub async fn live_voting<S: VotingStore>(
    State(state): State<AppState<S>>,
    PathId(voting_id): PathId<Uuid>,
    viewer: Viewer,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // 404 up front instead of an empty stream
    state.service.get_voting(voting_id).await?;

    let events = watch_voting(state.service.clone(), voting_id, viewer).filter_map(
        |view| async move {
            match Event::default().event("voting").json_data(&view) {
                Ok(event) => Some(Ok(event)),
                Err(err) => {
                    warn!("Failed to encode live view: {err}");
                    None
                }
            }
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
