// src/tally.rs
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Vote, VotingOption};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionTally {
    pub option_id: Uuid,
    pub text: String,
    pub count: u64,
    /// Share of all votes, rounded to one decimal. Not normalised to 100.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub options: Vec<OptionTally>,
    pub total_votes: u64,
    pub unique_voters: u64,
}

pub fn tally(options: &[VotingOption], votes: &[Vote]) -> Tally {
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(votes.len());
    let mut counts: HashMap<Uuid, u64> = HashMap::with_capacity(options.len());
    let mut voters: HashSet<&str> = HashSet::new();

    for vote in votes {
        if !seen.insert(vote.id) {
            continue;
        }
        *counts.entry(vote.option_id).or_default() += 1;
        voters.insert(vote.voter_uuid.as_str());
    }

    let total_votes = seen.len() as u64;

    let options = options
        .iter()
        .map(|option| {
            let count = counts.get(&option.id).copied().unwrap_or(0);
            OptionTally {
                option_id: option.id,
                text: option.text.clone(),
                count,
                percentage: percentage(count, total_votes),
            }
        })
        .collect();

    Tally {
        options,
        total_votes,
        unique_voters: voters.len() as u64,
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    (count as f64 / total as f64 * 1000.0).round() / 10.0
}
