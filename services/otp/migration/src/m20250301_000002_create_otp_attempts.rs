use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OtpAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpAttempts::ChallengeId).uuid())
                    .col(ColumnDef::new(OtpAttempts::Recipient).string().not_null())
                    .col(ColumnDef::new(OtpAttempts::Purpose).string().not_null())
                    .col(ColumnDef::new(OtpAttempts::SuppliedCode).string().not_null())
                    .col(ColumnDef::new(OtpAttempts::Succeeded).boolean().not_null())
                    .col(ColumnDef::new(OtpAttempts::FailureReason).string())
                    .col(ColumnDef::new(OtpAttempts::IpAddress).string())
                    .col(
                        ColumnDef::new(OtpAttempts::AttemptedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(OtpAttempts::Table, OtpAttempts::ChallengeId)
                            .to(OtpChallenges::Table, OtpChallenges::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(OtpAttempts::Table)
                    .col(OtpAttempts::Recipient)
                    .col(OtpAttempts::AttemptedAt)
                    .name("idx_otp_attempts_recipient_attempted_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpAttempts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpAttempts {
    Table,
    Id,
    ChallengeId,
    Recipient,
    Purpose,
    SuppliedCode,
    Succeeded,
    FailureReason,
    IpAddress,
    AttemptedAt,
}

#[derive(Iden)]
enum OtpChallenges {
    Table,
    Id,
}
