//! PostgreSQL gateway backed by `sqlx`.
//!
//! The pool is capped at one connection so every statement runs in the
//! same session, which is what the selector tables are keyed on. A
//! transaction is opened lazily on the first statement and held until
//! `commit` or `rollback`.
//!
//! Table, view and schema names are interpolated into SQL; they come from
//! catalog config, which rejects anything that is not a plain identifier.

use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use tilesync_core::BBox;
use tracing::debug;

use crate::error::{SeedError, SeedResult};
use crate::gateway::{
    ClusterRow, FEATURE_BOUNDARY_FN, GeoStore, PartitionSource, SET_SELECTORS_FN, StoreFuture,
};

fn db_err(e: sqlx::Error) -> SeedError {
    SeedError::Database(e.to_string())
}

pub struct PgGeoStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgGeoStore {
    pub async fn connect(url: &str) -> SeedResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(db_err)?;
        debug!("database session opened");
        Ok(Self { pool, tx: None })
    }

    async fn tx(&mut self) -> SeedResult<&mut Transaction<'static, Postgres>> {
        if self.tx.is_none() {
            let tx = self.pool.begin().await.map_err(db_err)?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| SeedError::Database("transaction not open".to_string()))
    }
}

impl GeoStore for PgGeoStore {
    fn clear_selectors<'a>(&'a mut self, schema: &'a str, table: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let sql = format!("DELETE FROM {schema}.{table} WHERE cur_user = current_user");
            let tx = self.tx().await?;
            let done = sqlx::query(&sql).execute(&mut **tx).await.map_err(db_err)?;
            Ok(done.rows_affected())
        })
    }

    fn set_selector<'a>(
        &'a mut self,
        schema: &'a str,
        envelope: &'a Value,
    ) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            let sql = format!("SELECT {schema}.{SET_SELECTORS_FN}($1::json)");
            let tx = self.tx().await?;
            let row = sqlx::query(&sql)
                .bind(envelope.to_string())
                .fetch_one(&mut **tx)
                .await
                .map_err(db_err)?;
            let reply: Option<Value> = row.try_get(0).map_err(db_err)?;
            Ok(reply.unwrap_or(Value::Null))
        })
    }

    fn refresh_view<'a>(&'a mut self, view: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let sql = format!("REFRESH MATERIALIZED VIEW {view}");
            let tx = self.tx().await?;
            sqlx::query(&sql).execute(&mut **tx).await.map_err(db_err)?;
            Ok(())
        })
    }

    fn cluster_ids<'a>(&'a mut self, source: PartitionSource<'a>) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {id}::text FROM {table}",
                id = source.id_column,
                table = source.table,
            );
            let tx = self.tx().await?;
            let rows = sqlx::query(&sql).fetch_all(&mut **tx).await.map_err(db_err)?;
            rows.iter()
                .map(|row| row.try_get::<String, _>(0).map_err(db_err))
                .collect()
        })
    }

    fn clusters<'a>(&'a mut self, source: PartitionSource<'a>) -> StoreFuture<'a, Vec<ClusterRow>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {id}::text, ST_AsText({geom}), Box2D({geom})::text FROM {table} ORDER BY 1",
                id = source.id_column,
                geom = source.geom_column,
                table = source.table,
            );
            let tx = self.tx().await?;
            let rows = sqlx::query(&sql).fetch_all(&mut **tx).await.map_err(db_err)?;
            let mut clusters = Vec::with_capacity(rows.len());
            for row in &rows {
                let id: String = row.try_get(0).map_err(db_err)?;
                let footprint: String = row.try_get(1).map_err(db_err)?;
                let extent: String = row.try_get(2).map_err(db_err)?;
                let bbox = BBox::parse_box2d(&extent)
                    .map_err(|e| SeedError::Database(format!("cluster {id}: {e}")))?;
                clusters.push(ClusterRow {
                    id,
                    footprint,
                    bbox,
                });
            }
            Ok(clusters)
        })
    }

    fn feature_boundary<'a>(
        &'a mut self,
        schema: &'a str,
        envelope: &'a Value,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let sql = format!("SELECT {schema}.{FEATURE_BOUNDARY_FN}($1::json)");
            let tx = self.tx().await?;
            let row = sqlx::query(&sql)
                .bind(envelope.to_string())
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_err)?;
            match row {
                Some(row) => row.try_get::<Option<Value>, _>(0).map_err(db_err),
                None => Ok(None),
            }
        })
    }

    fn commit(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(tx) = self.tx.take() {
                tx.commit().await.map_err(db_err)?;
            }
            Ok(())
        })
    }

    fn rollback(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(tx) = self.tx.take() {
                tx.rollback().await.map_err(db_err)?;
            }
            Ok(())
        })
    }
}
