// src/store/mod.rs
use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    feed::ChangeFeed,
    models::{NewVoting, Vote, Voting, VotingOption, VotingPatch, VotingWithTotal},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Uniqueness constraint violated")]
    UniqueViolation,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Votes are unique per `(voting_id, option_id, voter_uuid)` and a batch is
/// rejected whole. Every committed write is published on [`Self::feed`].
pub trait VotingStore: Clone + Send + Sync + 'static {
    fn feed(&self) -> &ChangeFeed;

    fn insert_voting(
        &self,
        voting: NewVoting,
        options: Vec<String>,
    ) -> impl Future<Output = Result<(Voting, Vec<VotingOption>), StoreError>> + Send;

    /// Newest first, optionally restricted to one creator.
    fn list_votings(
        &self,
        creator_id: Option<String>,
    ) -> impl Future<Output = Result<Vec<VotingWithTotal>, StoreError>> + Send;

    fn get_voting(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Voting>, StoreError>> + Send;

    /// In creation order.
    fn list_options(
        &self,
        voting_id: Uuid,
    ) -> impl Future<Output = Result<Vec<VotingOption>, StoreError>> + Send;

    fn list_votes(
        &self,
        voting_id: Uuid,
        voter_uuid: Option<String>,
    ) -> impl Future<Output = Result<Vec<Vote>, StoreError>> + Send;

    fn insert_votes(
        &self,
        voting_id: Uuid,
        voter_uuid: String,
        option_ids: Vec<Uuid>,
    ) -> impl Future<Output = Result<Vec<Vote>, StoreError>> + Send;

    /// `None` when the voting does not exist.
    fn update_voting(
        &self,
        id: Uuid,
        patch: VotingPatch,
    ) -> impl Future<Output = Result<Option<Voting>, StoreError>> + Send;

    /// `false` when there was nothing to delete.
    fn delete_voting(&self, id: Uuid) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
