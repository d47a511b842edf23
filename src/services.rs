// src/services.rs
use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    feed::{ChangeFilter, Subscription},
    identity::{CurrentUser, Viewer, VoterIdentity},
    models::{
        CreateVotingRequest, NewVoting, UpdateVotingRequest, Vote, Voting, VotingDetail,
        VotingOption, VotingPatch, VotingSummary,
    },
    policy::{self, DenyReason, Eligibility},
    store::{StoreError, VotingStore},
    tally::{tally, Tally},
};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 50;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_OPTION_LEN: usize = 200;

/// Outcome of a vote submission. A resubmission records nothing and sets
/// `already_recorded`; it is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub recorded: usize,
    pub already_recorded: bool,
    /// Every option this device has voted for on the voting, after the submission.
    pub voted_option_ids: Vec<Uuid>,
}

impl SubmitReceipt {
    fn already(existing: &[Vote]) -> Self {
        Self {
            recorded: 0,
            already_recorded: true,
            voted_option_ids: existing.iter().map(|vote| vote.option_id).collect(),
        }
    }
}

/// What a visitor of the voting page gets to see right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VotingView {
    #[serde(flatten)]
    pub voting: Voting,
    pub options: Vec<VotingOption>,
    pub share_url: String,
    pub is_ended: bool,
    pub is_owner: bool,
    pub has_voted: bool,
    pub voted_option_ids: Vec<Uuid>,
    pub eligibility: Eligibility,
    /// Present only while the Reveal Gate is open for this viewer.
    pub results: Option<Tally>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VotingStats {
    #[serde(flatten)]
    pub voting: Voting,
    pub is_ended: bool,
    pub is_owner: bool,
    #[serde(flatten)]
    pub tally: Tally,
}

#[derive(Clone)]
pub struct VotingService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    public_base_url: Arc<str>,
}

impl<S: VotingStore> VotingService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, public_base_url: &str) -> Self {
        Self {
            store,
            clock,
            public_base_url: Arc::from(public_base_url.trim_end_matches('/')),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn share_url(&self, voting_id: Uuid) -> String {
        format!("{}/vote/{voting_id}", self.public_base_url)
    }

    pub fn subscribe(&self, voting_id: Uuid) -> Subscription {
        self.store.feed().subscribe(ChangeFilter::Voting(voting_id))
    }

    pub async fn create_voting(
        &self,
        creator: &CurrentUser,
        request: CreateVotingRequest,
    ) -> Result<VotingDetail, AppError> {
        let title = required_text(&request.title, "Title", MAX_TITLE_LEN)?;
        let description = required_text(&request.description, "Description", usize::MAX)?;

        if request.end_at <= self.now() {
            return Err(AppError::validation("End time must be in the future"));
        }

        let options = request
            .options
            .iter()
            .map(|text| required_text(text, "Option text", MAX_OPTION_LEN))
            .collect::<Result<Vec<_>, _>>()?;

        if options.len() < MIN_OPTIONS {
            return Err(AppError::validation(format!(
                "At least {MIN_OPTIONS} options are required"
            )));
        }
        if options.len() > MAX_OPTIONS {
            return Err(AppError::validation(format!(
                "At most {MAX_OPTIONS} options are allowed"
            )));
        }

        let new = NewVoting {
            creator_id: creator.id.clone(),
            title,
            description,
            multiple_choice: request.multiple_choice,
            reveal_mode: request.reveal_mode,
            end_at: request.end_at,
        };

        let (voting, options) = self.store.insert_voting(new, options).await?;
        info!(voting_id = %voting.id, creator = %voting.creator_id, "Created voting");

        Ok(VotingDetail {
            share_url: self.share_url(voting.id),
            voting,
            options,
        })
    }

    pub async fn list_votings(
        &self,
        creator_id: Option<String>,
    ) -> Result<Vec<VotingSummary>, AppError> {
        let now = self.now();
        let votings = self.store.list_votings(creator_id).await?;

        Ok(votings
            .into_iter()
            .map(|row| VotingSummary {
                is_ended: row.voting.has_ended(now),
                share_url: self.share_url(row.voting.id),
                voting: row.voting,
                total_votes: row.total_votes,
            })
            .collect())
    }

    pub async fn get_voting(&self, voting_id: Uuid) -> Result<Voting, AppError> {
        self.store
            .get_voting(voting_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn voting_view(&self, voting_id: Uuid, viewer: &Viewer) -> Result<VotingView, AppError> {
        let voting = self.get_voting(voting_id).await?;
        let options = self.store.list_options(voting_id).await?;
        let votes = self.store.list_votes(voting_id, None).await?;
        let now = self.now();

        let own_votes: Vec<Vote> = match &viewer.voter {
            Some(voter) => votes
                .iter()
                .filter(|vote| vote.voter_uuid == voter.as_str())
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let has_voted = !own_votes.is_empty();
        let is_owner = policy::is_owner(&voting, viewer.user.as_ref());

        let results = policy::can_see_results(&voting, is_owner, has_voted, now)
            .then(|| tally(&options, &votes));

        Ok(VotingView {
            share_url: self.share_url(voting.id),
            is_ended: voting.has_ended(now),
            eligibility: policy::can_vote(&voting, now, &own_votes),
            voted_option_ids: own_votes.iter().map(|vote| vote.option_id).collect(),
            is_owner,
            has_voted,
            results,
            voting,
            options,
        })
    }

    /// Per-option counts and voter totals, behind the Reveal Gate.
    pub async fn voting_stats(
        &self,
        voting_id: Uuid,
        viewer: &Viewer,
    ) -> Result<VotingStats, AppError> {
        let voting = self.get_voting(voting_id).await?;
        let is_owner = policy::is_owner(&voting, viewer.user.as_ref());

        let has_voted = match (&viewer.voter, is_owner) {
            (_, true) | (None, false) => false,
            (Some(voter), false) => !self
                .store
                .list_votes(voting_id, Some(voter.as_str().to_string()))
                .await?
                .is_empty(),
        };

        let now = self.now();
        if !policy::can_see_results(&voting, is_owner, has_voted, now) {
            return Err(AppError::forbidden(policy::hidden_results_reason(&voting)));
        }

        let options = self.store.list_options(voting_id).await?;
        let votes = self.store.list_votes(voting_id, None).await?;

        Ok(VotingStats {
            is_ended: voting.has_ended(now),
            is_owner,
            tally: tally(&options, &votes),
            voting,
        })
    }

    /// The Vote Recorder.
    ///
    /// Options the device already voted for are dropped from the request, so
    /// retrying a submission is harmless. A uniqueness race with a concurrent
    /// submission of the same device is resolved by re-reading and retrying
    /// what is left.
    pub async fn submit_votes(
        &self,
        voting_id: Uuid,
        voter: &VoterIdentity,
        option_ids: &[Uuid],
    ) -> Result<SubmitReceipt, AppError> {
        let voting = self.get_voting(voting_id).await?;
        let requested: BTreeSet<Uuid> = option_ids.iter().copied().collect();

        if requested.is_empty() {
            return Err(AppError::validation("Choose at least one option"));
        }
        if !voting.multiple_choice && requested.len() != 1 {
            return Err(AppError::validation("This voting accepts exactly one option"));
        }

        let known: HashSet<Uuid> = self
            .store
            .list_options(voting_id)
            .await?
            .into_iter()
            .map(|option| option.id)
            .collect();
        if !requested.iter().all(|id| known.contains(id)) {
            return Err(AppError::validation("Unknown option for this voting"));
        }

        // each uniqueness race removes at least one option from the remainder
        let max_attempts = requested.len() + 1;
        for attempt in 1..=max_attempts {
            let existing = self
                .store
                .list_votes(voting_id, Some(voter.as_str().to_string()))
                .await?;

            match policy::can_vote(&voting, self.now(), &existing) {
                Eligibility::Denied(DenyReason::Ended) => {
                    return Err(AppError::validation("This voting has ended"));
                }
                Eligibility::Denied(DenyReason::AlreadyVoted) => {
                    return Ok(SubmitReceipt::already(&existing));
                }
                Eligibility::Allowed => {}
            }

            let remaining = policy::remaining_choices(&requested, &existing);
            if remaining.is_empty() {
                return Ok(SubmitReceipt::already(&existing));
            }

            match self
                .store
                .insert_votes(voting_id, voter.as_str().to_string(), remaining)
                .await
            {
                Ok(inserted) => {
                    info!(%voting_id, recorded = inserted.len(), "Recorded votes");

                    let voted_option_ids = existing
                        .iter()
                        .chain(inserted.iter())
                        .map(|vote| vote.option_id)
                        .collect();
                    return Ok(SubmitReceipt {
                        recorded: inserted.len(),
                        already_recorded: false,
                        voted_option_ids,
                    });
                }
                Err(StoreError::UniqueViolation) => {
                    warn!(%voting_id, attempt, "Concurrent submission from the same voter, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let existing = self
            .store
            .list_votes(voting_id, Some(voter.as_str().to_string()))
            .await?;
        let already_recorded = policy::remaining_choices(&requested, &existing).is_empty();
        if !already_recorded {
            warn!(%voting_id, "Gave up recording votes after repeated races");
        }

        Ok(SubmitReceipt {
            already_recorded,
            ..SubmitReceipt::already(&existing)
        })
    }

    pub async fn update_voting(
        &self,
        voting_id: Uuid,
        user: &CurrentUser,
        request: UpdateVotingRequest,
    ) -> Result<Voting, AppError> {
        let voting = self.owned_voting(voting_id, user).await?;

        let patch = VotingPatch {
            title: request
                .title
                .as_deref()
                .map(|title| required_text(title, "Title", MAX_TITLE_LEN))
                .transpose()?,
            description: request
                .description
                .as_deref()
                .map(|description| required_text(description, "Description", usize::MAX))
                .transpose()?,
            end_at: match request.end_at {
                Some(end_at) if end_at > voting.end_at => {
                    return Err(AppError::validation("End time can only be moved earlier"));
                }
                Some(end_at) if end_at == voting.end_at => None,
                other => other,
            },
        };

        self.apply_patch(voting, patch).await
    }

    /// Ends the voting now by server time. Never moves `end_at` later.
    pub async fn end_voting(&self, voting_id: Uuid, user: &CurrentUser) -> Result<Voting, AppError> {
        let voting = self.owned_voting(voting_id, user).await?;
        let now = self.now();

        if voting.has_ended(now) {
            return Ok(voting);
        }

        info!(%voting_id, "Ending voting early");
        self.apply_patch(
            voting,
            VotingPatch {
                end_at: Some(now),
                ..VotingPatch::default()
            },
        )
        .await
    }

    pub async fn delete_voting(&self, voting_id: Uuid, user: &CurrentUser) -> Result<(), AppError> {
        self.owned_voting(voting_id, user).await?;

        if !self.store.delete_voting(voting_id).await? {
            return Err(AppError::NotFound);
        }

        info!(%voting_id, "Deleted voting");
        Ok(())
    }

    async fn apply_patch(&self, voting: Voting, patch: VotingPatch) -> Result<Voting, AppError> {
        if patch.is_empty() {
            return Ok(voting);
        }

        self.store
            .update_voting(voting.id, patch)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn owned_voting(&self, voting_id: Uuid, user: &CurrentUser) -> Result<Voting, AppError> {
        let voting = self.get_voting(voting_id).await?;

        if !policy::is_owner(&voting, Some(user)) {
            return Err(AppError::forbidden("Only the creator of this voting can do that"));
        }

        Ok(voting)
    }
}

fn required_text(value: &str, field: &str, max_len: usize) -> Result<String, AppError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }

    Ok(value.to_string())
}
