// src/identity.rs
use axum::{
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_AVATAR_HEADER: &str = "x-user-avatar";
pub const VOTER_ID_HEADER: &str = "x-voter-id";

const MAX_VOTER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
}

impl CurrentUser {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let id = header_str(headers, USER_ID_HEADER)?;

        Some(Self {
            id,
            display_name: header_str(headers, USER_NAME_HEADER),
            avatar_ref: header_str(headers, USER_AVATAR_HEADER),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VoterIdentity(String);

impl VoterIdentity {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();

        if raw.is_empty() || raw.len() > MAX_VOTER_ID_LEN {
            return Err(AppError::validation("Invalid voter identity"));
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::validation("Invalid voter identity"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything known about the requester of a read.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub user: Option<CurrentUser>,
    pub voter: Option<VoterIdentity>,
}

#[derive(Deserialize)]
struct VoterQuery {
    voter: Option<String>,
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// `EventSource` cannot send custom headers, so the query string is accepted too.
fn voter_from_parts(parts: &Parts) -> Result<Option<VoterIdentity>, AppError> {
    if let Some(raw) = header_str(&parts.headers, VOTER_ID_HEADER) {
        return VoterIdentity::parse(&raw).map(Some);
    }

    match Query::<VoterQuery>::try_from_uri(&parts.uri) {
        Ok(Query(VoterQuery { voter: Some(raw) })) => VoterIdentity::parse(&raw).map(Some),
        _ => Ok(None),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        CurrentUser::from_headers(&parts.headers).ok_or(AppError::Unauthorized)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for VoterIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        voter_from_parts(parts)?.ok_or_else(|| AppError::validation("Missing voter identity"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer {
            user: CurrentUser::from_headers(&parts.headers),
            voter: voter_from_parts(parts)?,
        })
    }
}
