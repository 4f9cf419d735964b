use tilesync_core::CatalogConfig;
use tilesync_seed::{ChangeTracker, MapProxySeed, PgGeoStore, RunReport, SeedJobDispatcher};

use super::Context;

type Dispatcher<'c> = SeedJobDispatcher<'c, PgGeoStore, MapProxySeed>;

async fn dispatcher<'c>(
    ctx: &Context,
    catalog: &'c str,
    config: &'c CatalogConfig,
) -> anyhow::Result<Dispatcher<'c>> {
    // Take the lease before touching the database.
    let tracker = ChangeTracker::new(ctx.open_state(catalog)?);
    let store = PgGeoStore::connect(&config.database.url).await?;
    let renderer = MapProxySeed::new(config.seeding.engine.clone());
    Ok(SeedJobDispatcher::new(catalog, config, store, renderer, tracker)?)
}

pub async fn full(ctx: &Context, catalog: &str) -> anyhow::Result<()> {
    let config = ctx.load_config(catalog)?;
    let report = dispatcher(ctx, catalog, &config).await?.run_full().await?;
    finish(ctx, &report)
}

pub async fn delta(ctx: &Context, catalog: &str) -> anyhow::Result<()> {
    let config = ctx.load_config(catalog)?;
    let report = dispatcher(ctx, catalog, &config).await?.run_delta().await?;
    finish(ctx, &report)
}

pub async fn feature(ctx: &Context, catalog: &str, nodes: &[i64]) -> anyhow::Result<()> {
    let config = ctx.load_config(catalog)?;
    let report = dispatcher(ctx, catalog, &config)
        .await?
        .run_feature(nodes)
        .await?;
    finish(ctx, &report)
}

fn finish(ctx: &Context, report: &RunReport) -> anyhow::Result<()> {
    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", format_report(report));
    }
    if !report.is_clean() {
        anyhow::bail!("{} cluster(s) failed to seed", report.failed.len());
    }
    Ok(())
}

pub fn format_report(report: &RunReport) -> String {
    let mut out = format!(
        "{} seed of `{}`: {} seeded, {} skipped, {} failed ({}s)\n",
        report.mode.as_str(),
        report.catalog,
        report.seeded.len(),
        report.skipped.len(),
        report.failed.len(),
        (report.finished - report.started).num_seconds(),
    );
    for id in &report.seeded {
        out.push_str(&format!("  ✓ {id}\n"));
    }
    for failure in &report.failed {
        out.push_str(&format!("  ✗ {}: {}\n", failure.cluster, failure.reason));
    }
    out
}
