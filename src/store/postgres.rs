// src/store/postgres.rs
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{StoreError, VotingStore};
use crate::{
    feed::{ChangeFeed, ChangeRow, EventKind},
    models::{NewVoting, Vote, Voting, VotingOption, VotingPatch, VotingWithTotal},
};

const VOTING_COLUMNS: &str =
    "id, creator_id, title, description, multiple_choice, reveal_mode, end_at, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgStore {
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation,
        _ => StoreError::Database(err),
    }
}

impl VotingStore for PgStore {
    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    async fn insert_voting(
        &self,
        new: NewVoting,
        options: Vec<String>,
    ) -> Result<(Voting, Vec<VotingOption>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO votings (id, creator_id, title, description, multiple_choice, reveal_mode, end_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {VOTING_COLUMNS}"
        );
        let voting = sqlx::query_as::<_, Voting>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.creator_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.multiple_choice)
            .bind(new.reveal_mode)
            .bind(new.end_at)
            .fetch_one(&mut *tx)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO options (id, voting_id, text, position) ");
        builder.push_values(options.into_iter().enumerate(), |mut row, (position, text)| {
            row.push_bind(Uuid::new_v4())
                .push_bind(voting.id)
                .push_bind(text)
                .push_bind(position as i32);
        });
        builder.push(" RETURNING id, voting_id, text, position");

        let mut options: Vec<VotingOption> = builder
            .build_query_as::<VotingOption>()
            .fetch_all(&mut *tx)
            .await?;
        options.sort_by_key(|option| option.position);

        tx.commit().await?;
        debug!(voting_id = %voting.id, options = options.len(), "Inserted voting");

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
        let votings = sqlx::query_as::<_, VotingWithTotal>(
            r#"
            SELECT v.id, v.creator_id, v.title, v.description, v.multiple_choice,
                   v.reveal_mode, v.end_at, v.created_at,
                   COUNT(vo.id) AS total_votes
            FROM votings v
            LEFT JOIN votes vo ON vo.voting_id = v.id
            WHERE $1::text IS NULL OR v.creator_id = $1
            GROUP BY v.id
            ORDER BY v.created_at DESC
            "#,
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votings)
    }

    async fn get_voting(&self, id: Uuid) -> Result<Option<Voting>, StoreError> {
        let sql = format!("SELECT {VOTING_COLUMNS} FROM votings WHERE id = $1");
        let voting = sqlx::query_as::<_, Voting>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(voting)
    }

    async fn list_options(&self, voting_id: Uuid) -> Result<Vec<VotingOption>, StoreError> {
        let options = sqlx::query_as::<_, VotingOption>(
            "SELECT id, voting_id, text, position FROM options WHERE voting_id = $1 ORDER BY position",
        )
        .bind(voting_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    async fn list_votes(
        &self,
        voting_id: Uuid,
        voter_uuid: Option<String>,
    ) -> Result<Vec<Vote>, StoreError> {
        let votes = sqlx::query_as::<_, Vote>(
            r#"
            SELECT id, voting_id, option_id, voter_uuid, created_at
            FROM votes
            WHERE voting_id = $1 AND ($2::text IS NULL OR voter_uuid = $2)
            ORDER BY created_at
            "#,
        )
        .bind(voting_id)
        .bind(voter_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }

    async fn insert_votes(
        &self,
        voting_id: Uuid,
        voter_uuid: String,
        option_ids: Vec<Uuid>,
    ) -> Result<Vec<Vote>, StoreError> {
        if option_ids.is_empty() {
            return Ok(Vec::new());
        }

        // a single statement is atomic; one duplicate aborts every row
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO votes (id, voting_id, option_id, voter_uuid) ");
        builder.push_values(option_ids, |mut row, option_id| {
            row.push_bind(Uuid::new_v4())
                .push_bind(voting_id)
                .push_bind(option_id)
                .push_bind(voter_uuid.clone());
        });
        builder.push(" RETURNING id, voting_id, option_id, voter_uuid, created_at");

        let votes = builder
            .build_query_as::<Vote>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_write_error)?;

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
        let sql = format!(
            "UPDATE votings SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                end_at = COALESCE($4, end_at) \
             WHERE id = $1 RETURNING {VOTING_COLUMNS}"
        );
        let voting = sqlx::query_as::<_, Voting>(&sql)
            .bind(id)
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.end_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(voting) = &voting {
            self.feed
                .publish_all(EventKind::Update, [ChangeRow::Voting(voting.clone())]);
        }

        Ok(voting)
    }

    async fn delete_voting(&self, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM votings WHERE id = $1 RETURNING {VOTING_COLUMNS}");
        let deleted = sqlx::query_as::<_, Voting>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match deleted {
            Some(voting) => {
                self.feed
                    .publish_all(EventKind::Delete, [ChangeRow::Voting(voting)]);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
