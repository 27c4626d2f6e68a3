use sea_orm_migration::prelude::*;

use keystone_control_plane_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
