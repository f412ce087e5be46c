use std::sync::Arc;

use anyhow::{Context, Result};

use justifi_core::config::AppConfig;
use justifi_db::repositories::{
    SqlJustificationRepository, SqlPlanRepository, SqlRuleRepository, SqlTaskRepository,
    SqlTransitionStore,
};
use justifi_db::{connect_with_settings, migrations, DbPool};
use justifi_engine::WorkflowEngine;

pub struct App {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<WorkflowEngine>,
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<App> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .with_context(|| format!("could not connect to database `{}`", config.database.url))?;

    migrations::run_pending(&db_pool).await.context("could not run database migrations")?;

    let engine = Arc::new(
        WorkflowEngine::new(
            Arc::new(SqlRuleRepository::new(db_pool.clone())),
            Arc::new(SqlJustificationRepository::new(db_pool.clone())),
            Arc::new(SqlPlanRepository::new(db_pool.clone())),
            Arc::new(SqlTaskRepository::new(db_pool.clone())),
            Arc::new(SqlTransitionStore::new(db_pool.clone())),
        )
        .with_transition_retry_limit(config.engine.transition_retry_limit),
    );

    tracing::info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        database_url = %config.database.url,
        "engine and store initialized"
    );

    Ok(App { config, db_pool, engine })
}
