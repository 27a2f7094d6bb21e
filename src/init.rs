use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::telemetry::{self};
use crate::telemetry::ops::init::Phase as InitPhase;

#[derive(Serialize)]
struct InitResult {
    migrated: bool,
}

pub async fn connect(dsn: &str) -> Result<PgPool> {
    let log = telemetry::init();
    let _s = log.span(&InitPhase::Connect).entered();
    PgPoolOptions::new()
        .max_connections(16)
        .connect(dsn)
        .await
        .context("connecting to Postgres")
}

pub async fn run(pool: &PgPool) -> Result<()> {
    let log = telemetry::init();
    let _g = log.root_span().entered();
    {
        let _s = log.span(&InitPhase::Migrate).entered();
        // apply pending migrations (idempotent)
        sqlx::migrate!().run(pool).await.context("applying migrations")?;
    }
    log.info("✅ Database initialized");
    if telemetry::config::json_mode() {
        log.result(&InitResult { migrated: true })?;
    }
    Ok(())
}
