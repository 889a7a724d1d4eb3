use sea_orm_migration::prelude::*;

use agri_otp_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
