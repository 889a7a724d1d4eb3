use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OtpChallenges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpChallenges::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpChallenges::Recipient).string().not_null())
                    .col(ColumnDef::new(OtpChallenges::Purpose).string().not_null())
                    .col(ColumnDef::new(OtpChallenges::Code).string().not_null())
                    .col(ColumnDef::new(OtpChallenges::Status).string().not_null())
                    .col(
                        ColumnDef::new(OtpChallenges::AttemptsUsed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OtpChallenges::MaxAttempts).integer().not_null())
                    .col(ColumnDef::new(OtpChallenges::UserId).uuid())
                    .col(ColumnDef::new(OtpChallenges::IpAddress).string())
                    .col(ColumnDef::new(OtpChallenges::UserAgent).text())
                    .col(
                        ColumnDef::new(OtpChallenges::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OtpChallenges::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OtpChallenges::VerifiedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(OtpChallenges::Table)
                    .col(OtpChallenges::Recipient)
                    .col(OtpChallenges::Purpose)
                    .col(OtpChallenges::CreatedAt)
                    .name("idx_otp_challenges_pair_created_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(OtpChallenges::Table)
                    .col(OtpChallenges::Status)
                    .col(OtpChallenges::ExpiresAt)
                    .name("idx_otp_challenges_status_expires_at")
                    .to_owned(),
            )
            .await?;

        // At most one pending challenge per (recipient, purpose).
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_otp_challenges_pending \
                 ON otp_challenges (recipient, purpose) WHERE status = 'pending'",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpChallenges::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpChallenges {
    Table,
    Id,
    Recipient,
    Purpose,
    Code,
    Status,
    AttemptsUsed,
    MaxAttempts,
    UserId,
    IpAddress,
    UserAgent,
    CreatedAt,
    ExpiresAt,
    VerifiedAt,
}
