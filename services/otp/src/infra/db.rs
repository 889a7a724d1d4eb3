use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    TransactionTrait,
};

use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::{ChallengeId, UserId};
use agri_domain::purpose::Purpose;
use agri_otp_schema::{otp_attempts, otp_challenges};

use crate::domain::repository::{AttemptLog, ChallengeStore};
use crate::domain::types::{AttemptRecord, Challenge, StatusCount};
use crate::error::OtpServiceError;

/// Postgres-backed challenge store and attempt log.
///
/// Writes to a `(recipient, purpose)` pair run inside a transaction holding
/// `pg_advisory_xact_lock` on the pair, so concurrent instances serialize per
/// pair only. The partial unique index `uq_otp_challenges_pending` backs the
/// one-pending-per-pair invariant at the storage level.
#[derive(Clone)]
pub struct DbOtpStore {
    pub db: DatabaseConnection,
}

fn pair_lock_key(recipient: &str, purpose: Purpose) -> String {
    format!("otp:{purpose}:{recipient}")
}

async fn lock_pair(
    txn: &DatabaseTransaction,
    recipient: &str,
    purpose: Purpose,
) -> Result<(), sea_orm::DbErr> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [pair_lock_key(recipient, purpose).into()],
    ))
    .await?;
    Ok(())
}

fn pair_filter(recipient: &str, purpose: Purpose) -> sea_orm::Condition {
    sea_orm::Condition::all()
        .add(otp_challenges::Column::Recipient.eq(recipient))
        .add(otp_challenges::Column::Purpose.eq(purpose.as_str()))
}

impl ChallengeStore for DbOtpStore {
    async fn replace_pending(&self, challenge: &Challenge) -> Result<u64, OtpServiceError> {
        let txn = self.db.begin().await.context("begin replace_pending")?;
        lock_pair(&txn, &challenge.recipient, challenge.purpose)
            .await
            .context("lock challenge pair")?;

        let superseded = otp_challenges::Entity::update_many()
            .col_expr(
                otp_challenges::Column::Status,
                Expr::value(ChallengeStatus::Expired.as_str()),
            )
            .filter(pair_filter(&challenge.recipient, challenge.purpose))
            .filter(otp_challenges::Column::Status.eq(ChallengeStatus::Pending.as_str()))
            .exec(&txn)
            .await
            .context("expire pending challenges")?
            .rows_affected;

        challenge_to_active_model(challenge)
            .insert(&txn)
            .await
            .context("insert challenge")?;
        txn.commit().await.context("commit replace_pending")?;
        Ok(superseded)
    }

    async fn find_latest(
        &self,
        recipient: &str,
        purpose: Purpose,
    ) -> Result<Option<Challenge>, OtpServiceError> {
        let model = otp_challenges::Entity::find()
            .filter(pair_filter(recipient, purpose))
            .order_by_desc(otp_challenges::Column::CreatedAt)
            .order_by_desc(otp_challenges::Column::Id)
            .one(&self.db)
            .await
            .context("find latest challenge")?;
        Ok(model.map(challenge_from_model).transpose()?)
    }

    async fn mark_delivery_failed(&self, challenge: &Challenge) -> Result<(), OtpServiceError> {
        otp_challenges::Entity::update_many()
            .col_expr(
                otp_challenges::Column::Status,
                Expr::value(ChallengeStatus::Failed.as_str()),
            )
            .filter(otp_challenges::Column::Id.eq(challenge.id.0))
            .filter(otp_challenges::Column::Status.eq(ChallengeStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .context("mark challenge failed")?;
        Ok(())
    }

    async fn update_latest<F, T>(
        &self,
        recipient: &str,
        purpose: Purpose,
        f: F,
    ) -> Result<T, OtpServiceError>
    where
        F: FnOnce(Option<&mut Challenge>) -> T + Send,
        T: Send,
    {
        let txn = self.db.begin().await.context("begin update_latest")?;
        lock_pair(&txn, recipient, purpose)
            .await
            .context("lock challenge pair")?;

        let model = otp_challenges::Entity::find()
            .filter(pair_filter(recipient, purpose))
            .order_by_desc(otp_challenges::Column::CreatedAt)
            .order_by_desc(otp_challenges::Column::Id)
            .lock_exclusive()
            .one(&txn)
            .await
            .context("select latest challenge for update")?;

        let Some(model) = model else {
            txn.commit().await.context("commit update_latest")?;
            return Ok(f(None));
        };
        let original = challenge_from_model(model)?;
        let mut challenge = original.clone();
        let result = f(Some(&mut challenge));

        if challenge != original {
            otp_challenges::ActiveModel {
                id: Set(challenge.id.0),
                status: Set(challenge.status.as_str().to_owned()),
                attempts_used: Set(to_db_count(challenge.attempts_used)),
                verified_at: Set(challenge.verified_at),
                ..Default::default()
            }
            .update(&txn)
            .await
            .context("update challenge")?;
        }
        txn.commit().await.context("commit update_latest")?;
        Ok(result)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let result = otp_challenges::Entity::update_many()
            .col_expr(
                otp_challenges::Column::Status,
                Expr::value(ChallengeStatus::Expired.as_str()),
            )
            .filter(otp_challenges::Column::Status.eq(ChallengeStatus::Pending.as_str()))
            .filter(otp_challenges::Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await
            .context("expire stale challenges")?;
        Ok(result.rows_affected)
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let result = otp_challenges::Entity::delete_many()
            .filter(otp_challenges::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("purge old challenges")?;
        Ok(result.rows_affected)
    }

    async fn status_counts_since(
        &self,
        since: DateTime<Utc>,
        recipient: Option<&str>,
    ) -> Result<Vec<StatusCount>, OtpServiceError> {
        let mut query = otp_challenges::Entity::find()
            .select_only()
            .column(otp_challenges::Column::Purpose)
            .column(otp_challenges::Column::Status)
            .column_as(Expr::col(otp_challenges::Column::Id).count(), "count")
            .filter(otp_challenges::Column::CreatedAt.gte(since));
        if let Some(recipient) = recipient {
            query = query.filter(otp_challenges::Column::Recipient.eq(recipient));
        }
        let rows: Vec<(String, String, i64)> = query
            .group_by(otp_challenges::Column::Purpose)
            .group_by(otp_challenges::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await
            .context("count challenges by status")?;

        rows.into_iter()
            .map(|(purpose, status, count)| -> Result<StatusCount, OtpServiceError> {
                Ok(StatusCount {
                    purpose: purpose.parse::<Purpose>().context("stored purpose")?,
                    status: status.parse::<ChallengeStatus>().context("stored status")?,
                    count: u64::try_from(count).unwrap_or_default(),
                })
            })
            .collect()
    }
}

impl AttemptLog for DbOtpStore {
    async fn append(&self, record: &AttemptRecord) -> Result<(), OtpServiceError> {
        otp_attempts::ActiveModel {
            id: Set(record.id),
            challenge_id: Set(record.challenge_id.map(|id| id.0)),
            recipient: Set(record.recipient.clone()),
            purpose: Set(record.purpose.as_str().to_owned()),
            supplied_code: Set(record.supplied_code.clone()),
            succeeded: Set(record.succeeded),
            failure_reason: Set(record.failure_reason.clone()),
            ip_address: Set(record.ip_address.clone()),
            attempted_at: Set(record.attempted_at),
        }
        .insert(&self.db)
        .await
        .context("insert attempt record")?;
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let result = otp_attempts::Entity::delete_many()
            .filter(otp_attempts::Column::AttemptedAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("purge old attempt records")?;
        Ok(result.rows_affected)
    }
}

fn to_db_count(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn challenge_to_active_model(challenge: &Challenge) -> otp_challenges::ActiveModel {
    otp_challenges::ActiveModel {
        id: Set(challenge.id.0),
        recipient: Set(challenge.recipient.clone()),
        purpose: Set(challenge.purpose.as_str().to_owned()),
        code: Set(challenge.code.clone()),
        status: Set(challenge.status.as_str().to_owned()),
        attempts_used: Set(to_db_count(challenge.attempts_used)),
        max_attempts: Set(to_db_count(challenge.max_attempts)),
        user_id: Set(challenge.user_id.map(|id| id.0)),
        ip_address: Set(challenge.ip_address.clone()),
        user_agent: Set(challenge.user_agent.clone()),
        created_at: Set(challenge.created_at),
        expires_at: Set(challenge.expires_at),
        verified_at: Set(challenge.verified_at),
    }
}

fn challenge_from_model(model: otp_challenges::Model) -> Result<Challenge, OtpServiceError> {
    Ok(Challenge {
        id: ChallengeId(model.id),
        recipient: model.recipient,
        purpose: model.purpose.parse::<Purpose>().context("stored purpose")?,
        code: model.code,
        status: model
            .status
            .parse::<ChallengeStatus>()
            .context("stored status")?,
        attempts_used: u32::try_from(model.attempts_used).unwrap_or_default(),
        max_attempts: u32::try_from(model.max_attempts).unwrap_or_default(),
        user_id: model.user_id.map(UserId),
        ip_address: model.ip_address,
        user_agent: model.user_agent,
        created_at: model.created_at,
        expires_at: model.expires_at,
        verified_at: model.verified_at,
    })
}
