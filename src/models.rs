// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When the aggregated results of a voting become visible to non-owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reveal_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RevealMode {
    #[default]
    AfterVote,
    AfterEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Voting {
    pub id: Uuid,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub multiple_choice: bool,
    pub reveal_mode: RevealMode,
    pub end_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Voting {
    /// The end instant itself already counts as ended.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VotingOption {
    pub id: Uuid,
    pub voting_id: Uuid,
    pub text: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub voting_id: Uuid,
    pub option_id: Uuid,
    pub voter_uuid: String,
    pub created_at: DateTime<Utc>,
}

/// A voting row joined with the number of votes cast on it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct VotingWithTotal {
    #[sqlx(flatten)]
    pub voting: Voting,
    pub total_votes: i64,
}

/// Fields of a voting that can be written at creation time.
#[derive(Debug, Clone)]
pub struct NewVoting {
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub multiple_choice: bool,
    pub reveal_mode: RevealMode,
    pub end_at: DateTime<Utc>,
}

/// A validated partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct VotingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub end_at: Option<DateTime<Utc>>,
}

impl VotingPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.end_at.is_none()
    }

    pub fn apply(&self, voting: &mut Voting) {
        if let Some(title) = &self.title {
            voting.title = title.clone();
        }
        if let Some(description) = &self.description {
            voting.description = description.clone();
        }
        if let Some(end_at) = self.end_at {
            voting.end_at = end_at;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateVotingRequest {
    pub title: String,
    pub description: String,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub multiple_choice: bool,
    #[serde(default)]
    pub reveal_mode: RevealMode,
    pub options: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateVotingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitVotesRequest {
    pub option_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListVotingsQuery {
    pub creator: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VotingDetail {
    #[serde(flatten)]
    pub voting: Voting,
    pub options: Vec<VotingOption>,
    pub share_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VotingSummary {
    #[serde(flatten)]
    pub voting: Voting,
    pub total_votes: i64,
    pub is_ended: bool,
    pub share_url: String,
}

#[derive(Debug, Serialize)]
pub struct VoterIdentityResponse {
    pub voter_id: String,
}
