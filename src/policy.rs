// src/policy.rs
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    identity::CurrentUser,
    models::{RevealMode, Vote, Voting},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Ended,
    AlreadyVoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Eligibility {
    Allowed,
    Denied(DenyReason),
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Eligibility::Allowed)
    }
}

/// Whether the device that cast `existing_votes` may vote on `voting` at `now`.
///
/// `existing_votes` must be that device's votes on this voting only.
/// Multiple-choice votings stay open per option: a device that already voted
/// may still add options it has not picked yet.
pub fn can_vote(voting: &Voting, now: DateTime<Utc>, existing_votes: &[Vote]) -> Eligibility {
    if voting.has_ended(now) {
        return Eligibility::Denied(DenyReason::Ended);
    }

    if !voting.multiple_choice && !existing_votes.is_empty() {
        return Eligibility::Denied(DenyReason::AlreadyVoted);
    }

    Eligibility::Allowed
}

/// Requested options minus the ones this device already voted for.
pub fn remaining_choices(requested: &BTreeSet<Uuid>, existing_votes: &[Vote]) -> Vec<Uuid> {
    let voted: BTreeSet<Uuid> = existing_votes.iter().map(|vote| vote.option_id).collect();

    requested.difference(&voted).copied().collect()
}

pub fn is_owner(voting: &Voting, user: Option<&CurrentUser>) -> bool {
    user.is_some_and(|user| user.id == voting.creator_id)
}

/// The Reveal Gate.
pub fn can_see_results(
    voting: &Voting,
    viewer_is_owner: bool,
    has_voted: bool,
    now: DateTime<Utc>,
) -> bool {
    if viewer_is_owner {
        return true;
    }

    match voting.reveal_mode {
        RevealMode::AfterVote => has_voted,
        RevealMode::AfterEnd => voting.has_ended(now),
    }
}

/// Why results are hidden, phrased for the viewer.
pub fn hidden_results_reason(voting: &Voting) -> &'static str {
    match voting.reveal_mode {
        RevealMode::AfterVote => "Results are shown after you vote",
        RevealMode::AfterEnd => "Results are shown after the voting ends",
    }
}
