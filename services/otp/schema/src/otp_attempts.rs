use sea_orm::entity::prelude::*;

/// Append-only audit row, one per verification call.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "otp_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub challenge_id: Option<Uuid>,
    pub recipient: String,
    pub purpose: String,
    pub supplied_code: String,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub attempted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::otp_challenges::Entity",
        from = "Column::ChallengeId",
        to = "super::otp_challenges::Column::Id",
        on_delete = "SetNull"
    )]
    Challenge,
}

impl Related<super::otp_challenges::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Challenge.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
