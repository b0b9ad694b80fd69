use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let database_uri = std::env::var("DATABASE_URI").context("DATABASE_URI must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_uri)
        .await
        .context("failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    println!("Migrations applied successfully");
    Ok(())
}
