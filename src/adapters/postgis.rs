//! PostGIS-backed phenology repository using Diesel.
//!
//! Expects a `phenology_metrics` table with a point geometry per row (see
//! [`SCHEMA_SQL`]). Spatial work (polygon parsing, validity, coverage) is left
//! to the database.

use crate::domain::model::{AreaFilter, AreaStats, Location, PhenologyMetric};
use crate::domain::ports::PhenologyRepository;
use crate::utils::error::{PhenologyError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::{Bool, Date, Double, Integer, Nullable, Text};
use std::time::Duration;
use tokio::task;

type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS postgis;
CREATE TABLE IF NOT EXISTS phenology_metrics (
    product        TEXT NOT NULL,
    year           INTEGER NOT NULL,
    lon            DOUBLE PRECISION NOT NULL,
    lat            DOUBLE PRECISION NOT NULL,
    geom           geometry(Point, 4326) NOT NULL,
    sos_date       DATE,
    eos_date       DATE,
    season_length  INTEGER,
    is_forest      BOOLEAN NOT NULL,
    PRIMARY KEY (product, year, lon, lat)
);
CREATE INDEX IF NOT EXISTS phenology_metrics_geom_idx ON phenology_metrics USING GIST (geom);
"#;

const UPSERT_METRIC: &str = r#"
INSERT INTO phenology_metrics (
    product, year, lon, lat, geom,
    sos_date, eos_date, season_length, is_forest
)
VALUES ($1, $2, $3, $4, ST_SetSRID(ST_MakePoint($3, $4), 4326), $5, $6, $7, $8)
ON CONFLICT (product, year, lon, lat)
DO UPDATE SET
    sos_date = EXCLUDED.sos_date,
    eos_date = EXCLUDED.eos_date,
    season_length = EXCLUDED.season_length,
    is_forest = EXCLUDED.is_forest
"#;

const GET_METRIC_FOR_LOCATION: &str = r#"
SELECT year, lat, lon, sos_date, eos_date, season_length, is_forest
FROM phenology_metrics
WHERE product = $1 AND year = $2 AND lat = $3 AND lon = $4
"#;

const GET_TIMESERIES_FOR_LOCATION: &str = r#"
SELECT year, lat, lon, sos_date, eos_date, season_length, is_forest
FROM phenology_metrics
WHERE product = $1 AND lat = $2 AND lon = $3 AND year BETWEEN $4 AND $5
ORDER BY year ASC
"#;

// One row even when nothing matches, so validity is reported separately
// from emptiness.
const GET_AREA_STATS: &str = r#"
WITH poly AS (
    SELECT ST_SetSRID(ST_GeomFromGeoJSON($1), 4326) AS g
),
flags AS (
    SELECT g, (g IS NOT NULL AND NOT ST_IsEmpty(g) AND ST_IsValid(g)) AS ok
    FROM poly
)
SELECT
    f.ok AS ok,
    COUNT(m.*)::int AS n,
    AVG(m.season_length)::float AS mean_season_length,
    percentile_cont(0.5) WITHIN GROUP (ORDER BY m.season_length)::float AS median_season_length,
    AVG(CASE WHEN m.is_forest THEN 1 ELSE 0 END)::float AS forest_fraction
FROM flags f
LEFT JOIN phenology_metrics m
    ON f.ok
    AND m.product = $2
    AND m.year = $3
    AND ST_Covers(f.g, m.geom)
    AND ($4 = false OR m.is_forest = true)
    AND ($5::int IS NULL OR (m.season_length IS NOT NULL AND m.season_length >= $5::int))
GROUP BY f.ok
"#;

#[derive(Debug, QueryableByName)]
struct MetricRow {
    #[diesel(sql_type = Integer)]
    year: i32,
    #[diesel(sql_type = Double)]
    lat: f64,
    #[diesel(sql_type = Double)]
    lon: f64,
    #[diesel(sql_type = Nullable<Date>)]
    sos_date: Option<NaiveDate>,
    #[diesel(sql_type = Nullable<Date>)]
    eos_date: Option<NaiveDate>,
    #[diesel(sql_type = Nullable<Integer>)]
    season_length: Option<i32>,
    #[diesel(sql_type = Bool)]
    is_forest: bool,
}

impl MetricRow {
    fn into_metric(self) -> Result<PhenologyMetric> {
        let location = Location::new(self.lat, self.lon).map_err(|e| {
            PhenologyError::repository(format!("stored row has an invalid location: {}", e))
        })?;
        Ok(PhenologyMetric {
            year: self.year,
            location,
            sos_date: self.sos_date,
            eos_date: self.eos_date,
            season_length: self.season_length,
            is_forest: self.is_forest,
        })
    }
}

#[derive(Debug, QueryableByName)]
struct AreaStatsRow {
    #[diesel(sql_type = Bool)]
    ok: bool,
    #[diesel(sql_type = Integer)]
    n: i32,
    #[diesel(sql_type = Nullable<Double>)]
    mean_season_length: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    median_season_length: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    forest_fraction: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PostgisConfig {
    pub database_url: String,
    pub max_pool_size: u32,
    pub connection_timeout_sec: u64,
}

impl Default for PostgisConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            connection_timeout_sec: 30,
        }
    }
}

fn db_err(e: diesel::result::Error) -> PhenologyError {
    PhenologyError::repository(e.to_string())
}

#[derive(Clone)]
pub struct PostgisPhenologyRepository {
    pool: PgPool,
}

impl std::fmt::Debug for PostgisPhenologyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgisPhenologyRepository")
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

impl PostgisPhenologyRepository {
    pub fn new(config: &PostgisConfig) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| PhenologyError::repository(format!("cannot create pool: {}", e)))?;

        tracing::info!(
            "PostGIS repository ready (max {} connections)",
            config.max_pool_size
        );
        Ok(Self { pool })
    }

    /// Creates the table and spatial index if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.with_conn(|conn| conn.batch_execute(SCHEMA_SQL).map_err(db_err))
            .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PhenologyError::repository(format!("no connection: {}", e)))?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl PhenologyRepository for PostgisPhenologyRepository {
    async fn get_metric_for_location(
        &self,
        product: &str,
        location: &Location,
        year: i32,
    ) -> Result<Option<PhenologyMetric>> {
        let product = product.to_string();
        let (lat, lon) = (location.lat(), location.lon());
        let row = self
            .with_conn(move |conn| {
                sql_query(GET_METRIC_FOR_LOCATION)
                    .bind::<Text, _>(product)
                    .bind::<Integer, _>(year)
                    .bind::<Double, _>(lat)
                    .bind::<Double, _>(lon)
                    .get_result::<MetricRow>(conn)
                    .optional()
                    .map_err(db_err)
            })
            .await?;
        row.map(MetricRow::into_metric).transpose()
    }

    async fn get_timeseries_for_location(
        &self,
        product: &str,
        location: &Location,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<PhenologyMetric>> {
        if end_year < start_year {
            return Ok(Vec::new());
        }
        let product = product.to_string();
        let (lat, lon) = (location.lat(), location.lon());
        let rows = self
            .with_conn(move |conn| {
                sql_query(GET_TIMESERIES_FOR_LOCATION)
                    .bind::<Text, _>(product)
                    .bind::<Double, _>(lat)
                    .bind::<Double, _>(lon)
                    .bind::<Integer, _>(start_year)
                    .bind::<Integer, _>(end_year)
                    .load::<MetricRow>(conn)
                    .map_err(db_err)
            })
            .await?;
        rows.into_iter().map(MetricRow::into_metric).collect()
    }

    async fn get_area_stats(
        &self,
        product: &str,
        year: i32,
        polygon: &serde_json::Value,
        filter: &AreaFilter,
    ) -> Result<Option<AreaStats>> {
        let geojson = serde_json::to_string(polygon)?;
        let product = product.to_string();
        let filter = *filter;
        let row = self
            .with_conn(move |conn| {
                sql_query(GET_AREA_STATS)
                    .bind::<Text, _>(geojson)
                    .bind::<Text, _>(product)
                    .bind::<Integer, _>(year)
                    .bind::<Bool, _>(filter.only_forest)
                    .bind::<Nullable<Integer>, _>(filter.min_season_length)
                    .get_result::<AreaStatsRow>(conn)
                    .map_err(db_err)
            })
            .await?;

        if !row.ok {
            return Err(PhenologyError::validation(
                "Polygon geometry is empty or invalid",
            ));
        }
        if row.n == 0 {
            return Ok(None);
        }

        let stat = filter.season_length_stat;
        Ok(Some(AreaStats {
            n: i64::from(row.n),
            mean_season_length: row.mean_season_length.filter(|_| stat.wants_mean()),
            median_season_length: row.median_season_length.filter(|_| stat.wants_median()),
            forest_fraction: row.forest_fraction,
        }))
    }

    async fn upsert_many(&self, product: &str, metrics: &[PhenologyMetric]) -> Result<usize> {
        if metrics.is_empty() {
            return Ok(0);
        }
        let product = product.to_string();
        let metrics = metrics.to_vec();
        self.with_conn(move |conn| {
            conn.transaction::<usize, diesel::result::Error, _>(|conn| {
                for m in &metrics {
                    sql_query(UPSERT_METRIC)
                        .bind::<Text, _>(&product)
                        .bind::<Integer, _>(m.year)
                        .bind::<Double, _>(m.location.lon())
                        .bind::<Double, _>(m.location.lat())
                        .bind::<Nullable<Date>, _>(m.sos_date)
                        .bind::<Nullable<Date>, _>(m.eos_date)
                        .bind::<Nullable<Integer>, _>(m.season_length)
                        .bind::<Bool, _>(m.is_forest)
                        .execute(conn)?;
                }
                Ok(metrics.len())
            })
            .map_err(db_err)
        })
        .await
    }
}
