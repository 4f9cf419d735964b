//! Selector coordinator — scopes the database session to zone instances.
//!
//! Selector rows are keyed on the session user, so there is exactly one
//! live scope per session. Applying a scope always wipes every registered
//! zone's rows first (in the additional schema too, when configured) and
//! then sets the requested ones through the set-selector RPC. The whole
//! application is one transaction: any rejected call rolls it back.

use serde_json::{Value, json};
use tilesync_core::scope::cluster_scope;
use tilesync_core::{CatalogConfig, MapZone, ScopeEntry, ScopeValue, TileClusterId};
use tracing::debug;

use crate::error::{SeedError, SeedResult};
use crate::gateway::{GeoStore, rollback_on_err};

/// Status string the set-selector RPC returns on success.
pub const ACCEPTED: &str = "Accepted";

pub struct SelectorCoordinator<'c> {
    config: &'c CatalogConfig,
    epsg: u32,
}

impl<'c> SelectorCoordinator<'c> {
    pub fn new(config: &'c CatalogConfig) -> SeedResult<Self> {
        let epsg = config.epsg()?;
        Ok(Self { config, epsg })
    }

    /// Replace the session's scope with `scope`.
    pub async fn apply_scope<S: GeoStore>(
        &self,
        store: &mut S,
        scope: &[ScopeEntry],
    ) -> SeedResult<()> {
        let written = self.write_scope(store, scope).await;
        rollback_on_err(store, written).await?;
        store.commit().await?;
        debug!(entries = scope.len(), "selector scope applied");
        Ok(())
    }

    /// Narrow the session to exactly one cluster: one explicit id per
    /// zone the id carries.
    pub async fn apply_default_scope<S: GeoStore>(
        &self,
        store: &mut S,
        cluster: &TileClusterId,
    ) -> SeedResult<()> {
        self.apply_scope(store, &cluster_scope(cluster)).await
    }

    async fn write_scope<S: GeoStore>(&self, store: &mut S, scope: &[ScopeEntry]) -> SeedResult<()> {
        for schema in self.schemas() {
            for zone in MapZone::registry() {
                store.clear_selectors(schema, zone.selector_table).await?;
            }
        }

        let schema = self.config.database.schema.as_str();
        for entry in scope {
            let zone = entry.zone.zone();
            match &entry.value {
                ScopeValue::SelectAll => {
                    let reply = store.set_selector(schema, &self.envelope(zone, None)).await?;
                    check_status(&reply, zone, None)?;
                }
                ScopeValue::Ids(ids) => {
                    for id in ids {
                        let reply = store
                            .set_selector(schema, &self.envelope(zone, Some(id)))
                            .await?;
                        check_status(&reply, zone, Some(id))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn schemas(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config.database.schema.as_str())
            .chain(self.config.database.additional_schema.as_deref())
    }

    /// Set-selector request body. `None` selects every instance of the zone.
    pub fn envelope(&self, zone: &MapZone, id: Option<&str>) -> Value {
        let db = &self.config.database;
        let add_schema = db.additional_schema.as_deref().unwrap_or("NULL");
        let data = match id {
            Some(id) => json!({
                "filterFields": {},
                "pageInfo": {},
                "selectorType": "selector_basic",
                "tabName": zone.tab_name,
                "addSchema": add_schema,
                "id": id,
                "isAlone": "False",
                "disableParent": "False",
                "value": "True",
            }),
            None => json!({
                "filterFields": {},
                "pageInfo": {},
                "selectorType": "None",
                "tabName": zone.tab_name,
                "addSchema": add_schema,
                "checkAll": "True",
            }),
        };
        json!({
            "client": {
                "device": 5,
                "lang": db.lang,
                "cur_user": db.session_user,
                "tiled": "True",
                "infoType": 1,
                "epsg": self.epsg,
            },
            "form": {},
            "feature": {},
            "data": data,
        })
    }
}

fn check_status(reply: &Value, zone: &MapZone, id: Option<&str>) -> SeedResult<()> {
    match reply.get("status").and_then(Value::as_str) {
        Some(ACCEPTED) => Ok(()),
        other => Err(SeedError::SelectorRejected {
            zone: zone.kind,
            id: id.map(str::to_string),
            status: other.map_or_else(|| reply.to_string(), str::to_string),
        }),
    }
}
