use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use chaindb_schema::config::UpgraderConfig;
use chaindb_schema::{ChainDb, SchemaUpgrader, UpgradeStatus};

// =============================
// CLI entry
// =============================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cfg = UpgraderConfig::from_env_and_file()?;
    tracing::info!(
        "[chaindb-upgrade] build {}, database {}",
        env!("GIT_HASH"),
        cfg.database_path.display()
    );

    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let db = ChainDb::open(&cfg.database_path, &cfg.pool).context("failed to open chain database")?;
        if cfg.apply_base_schema {
            db.ensure_base_schema().context("failed to apply base schema")?;
        }

        let upgrader = SchemaUpgrader::new(db);
        match upgrader.status()? {
            UpgradeStatus::UpgradeRequired {
                current,
                target,
                pending,
            } => tracing::info!(
                "[chaindb-upgrade] Schema at version {}, target {}, pending migrations {:?}",
                current,
                target,
                pending
            ),
            status => tracing::debug!("[chaindb-upgrade] {:?}", status),
        }

        Ok(upgrader.upgrade_with_report()?)
    })
    .await
    .context("upgrade task panicked")??;

    if report.requires_refetch {
        tracing::warn!(
            "[chaindb-upgrade] Schema upgraded to version {}; previously derived chain data must be refetched",
            report.to_version
        );
    } else if report.upgraded() {
        tracing::info!("[chaindb-upgrade] Schema upgraded to version {}", report.to_version);
    } else {
        tracing::info!("[chaindb-upgrade] Schema is up to date at version {}", report.to_version);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
