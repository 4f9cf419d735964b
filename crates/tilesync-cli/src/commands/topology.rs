use tilesync_seed::{ChangeTracker, MapProxySeed, PgGeoStore, SeedJobDispatcher};

use super::Context;

pub async fn generate(ctx: &Context, catalog: &str) -> anyhow::Result<()> {
    let config = ctx.load_config(catalog)?;
    let tracker = ChangeTracker::new(ctx.open_state(catalog)?);
    let store = PgGeoStore::connect(&config.database.url).await?;
    let renderer = MapProxySeed::new(config.seeding.engine.clone());

    let mut dispatcher = SeedJobDispatcher::new(catalog, &config, store, renderer, tracker)?;
    let path = dispatcher.generate_topology().await?;

    if ctx.json() {
        println!("{}", serde_json::json!({ "catalog": catalog, "topology": path }));
    } else {
        println!("✓ Wrote {}", path.display());
    }
    Ok(())
}
