// src/store/memory.rs
use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, VotingStore};
use crate::{
    feed::{ChangeFeed, ChangeRow, EventKind},
    models::{NewVoting, Vote, Voting, VotingOption, VotingPatch, VotingWithTotal},
};

#[derive(Default)]
struct Tables {
    // insertion order
    votings: Vec<Voting>,
    options: Vec<VotingOption>,
    votes: Vec<Vote>,
    vote_keys: HashSet<(Uuid, Uuid, String)>,
}

/// Process-local store with the same guarantees as [`PgStore`](super::PgStore).
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            feed,
        }
    }
}

impl VotingStore for MemoryStore {
    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    async fn insert_voting(
        &self,
        new: NewVoting,
        options: Vec<String>,
    ) -> Result<(Voting, Vec<VotingOption>), StoreError> {
        let voting = Voting {
            id: Uuid::new_v4(),
            creator_id: new.creator_id,
            title: new.title,
            description: new.description,
            multiple_choice: new.multiple_choice,
            reveal_mode: new.reveal_mode,
            end_at: new.end_at,
            created_at: Utc::now(),
        };
        let options: Vec<VotingOption> = options
            .into_iter()
            .enumerate()
            .map(|(position, text)| VotingOption {
                id: Uuid::new_v4(),
                voting_id: voting.id,
                text,
                position: position as i32,
            })
            .collect();

        {
            let mut tables = self.tables.write().await;
            tables.votings.push(voting.clone());
            tables.options.extend(options.iter().cloned());
        }

        self.feed.publish_all(
            EventKind::Insert,
            std::iter::once(ChangeRow::Voting(voting.clone()))
                .chain(options.iter().cloned().map(ChangeRow::Option)),
        );

        Ok((voting, options))
    }

    async fn list_votings(
        &self,
        creator_id: Option<String>,
    ) -> Result<Vec<VotingWithTotal>, StoreError> {
        let tables = self.tables.read().await;

        let mut votings: Vec<VotingWithTotal> = tables
            .votings
            .iter()
            .rev()
            .filter(|voting| creator_id.as_ref().is_none_or(|id| &voting.creator_id == id))
            .map(|voting| VotingWithTotal {
                voting: voting.clone(),
                total_votes: tables
                    .votes
                    .iter()
                    .filter(|vote| vote.voting_id == voting.id)
                    .count() as i64,
            })
            .collect();
        // stable, so equal timestamps keep newest-inserted first
        votings.sort_by(|a, b| b.voting.created_at.cmp(&a.voting.created_at));

        Ok(votings)
    }

    async fn get_voting(&self, id: Uuid) -> Result<Option<Voting>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.votings.iter().find(|voting| voting.id == id).cloned())
    }

    async fn list_options(&self, voting_id: Uuid) -> Result<Vec<VotingOption>, StoreError> {
        let tables = self.tables.read().await;
        let mut options: Vec<VotingOption> = tables
            .options
            .iter()
            .filter(|option| option.voting_id == voting_id)
            .cloned()
            .collect();
        options.sort_by_key(|option| option.position);

        Ok(options)
    }

    async fn list_votes(
        &self,
        voting_id: Uuid,
        voter_uuid: Option<String>,
    ) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .filter(|vote| vote.voting_id == voting_id)
            .filter(|vote| voter_uuid.as_ref().is_none_or(|v| &vote.voter_uuid == v))
            .cloned()
            .collect())
    }

    async fn insert_votes(
        &self,
        voting_id: Uuid,
        voter_uuid: String,
        option_ids: Vec<Uuid>,
    ) -> Result<Vec<Vote>, StoreError> {
        let votes: Vec<Vote> = {
            let mut tables = self.tables.write().await;

            // all or nothing, like a transaction
            let mut batch_keys = HashSet::with_capacity(option_ids.len());
            for option_id in &option_ids {
                let key = (voting_id, *option_id, voter_uuid.clone());
                if tables.vote_keys.contains(&key) || !batch_keys.insert(key) {
                    return Err(StoreError::UniqueViolation);
                }
            }

            let now = Utc::now();
            let votes: Vec<Vote> = option_ids
                .into_iter()
                .map(|option_id| Vote {
                    id: Uuid::new_v4(),
                    voting_id,
                    option_id,
                    voter_uuid: voter_uuid.clone(),
                    created_at: now,
                })
                .collect();

            tables.vote_keys.extend(batch_keys);
            tables.votes.extend(votes.iter().cloned());
            votes
        };

        self.feed.publish_all(
            EventKind::Insert,
            votes.iter().cloned().map(ChangeRow::Vote),
        );

        Ok(votes)
    }

    async fn update_voting(
        &self,
        id: Uuid,
        patch: VotingPatch,
    ) -> Result<Option<Voting>, StoreError> {
        let updated = {
            let mut tables = self.tables.write().await;
            let Some(voting) = tables.votings.iter_mut().find(|voting| voting.id == id) else {
                return Ok(None);
            };
            patch.apply(voting);
            voting.clone()
        };

        self.feed
            .publish_all(EventKind::Update, [ChangeRow::Voting(updated.clone())]);

        Ok(Some(updated))
    }

    async fn delete_voting(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = {
            let mut tables = self.tables.write().await;
            let Some(index) = tables.votings.iter().position(|voting| voting.id == id) else {
                return Ok(false);
            };
            let voting = tables.votings.remove(index);

            tables.options.retain(|option| option.voting_id != id);
            tables.votes.retain(|vote| vote.voting_id != id);
            tables.vote_keys.retain(|(voting_id, _, _)| *voting_id != id);
            voting
        };

        self.feed
            .publish_all(EventKind::Delete, [ChangeRow::Voting(deleted)]);

        Ok(true)
    }
}
