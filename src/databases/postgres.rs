use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use super::database::Database;
use crate::error::{BenchError, Result};
use crate::model::{CaseRecord, RangeAverages, RangeTotals};

pub struct PostgreSQL {
    dsn: String,
    connect_timeout: Duration,
    client: Option<Client>,
    _connection: Option<tokio::task::JoinHandle<()>>,
}

#[async_trait]
impl Database for PostgreSQL {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn connect(&mut self) -> Result<()> {
        let mut config: tokio_postgres::Config = self.dsn.parse()?;
        config.connect_timeout(self.connect_timeout);
        let (client, connection) = config.connect(NoTls).await?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });

        self.client = Some(client);
        self._connection = Some(connection_task);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client = None;
        if let Some(handle) = self._connection.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client()?
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS covid_data (
                    date varchar NOT NULL,
                    state varchar NOT NULL,
                    city varchar NOT NULL,
                    place_type varchar,
                    confirmed bigint,
                    deaths bigint,
                    is_last boolean,
                    estimated_population bigint,
                    city_ibge_code bigint,
                    confirmed_per_100k_inhabitants double precision,
                    death_rate double precision,
                    PRIMARY KEY (date, city)
                )",
            )
            .await?;
        Ok(())
    }

    async fn load_records(&self, _batch_size: usize, records: &[CaseRecord]) -> Result<usize> {
        let client = self.client()?;
        let insert = client
            .prepare(
                "INSERT INTO covid_data (date, state, city, place_type, confirmed, deaths, \
                 is_last, estimated_population, city_ibge_code, \
                 confirmed_per_100k_inhabitants, death_rate) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .await?;

        let mut loaded = 0;
        for record in records {
            let params: [&(dyn ToSql + Sync); 11] = [
                &record.date,
                &record.state,
                &record.city,
                &record.place_type,
                &record.confirmed,
                &record.deaths,
                &record.is_last,
                &record.estimated_population,
                &record.city_ibge_code,
                &record.confirmed_per_100k_inhabitants,
                &record.death_rate,
            ];
            match client.execute(&insert, &params).await {
                Ok(_) => loaded += 1,
                Err(e) => error!("PostgreSQL: skipping row {record:?}: {e}"),
            }
        }
        Ok(loaded)
    }

    async fn cases_at(&self, date: &str, state: &str, city: &str) -> Result<Vec<CaseRecord>> {
        let rows = self
            .client()?
            .query(
                "SELECT * FROM covid_data WHERE date = $1 AND state = $2 AND city = $3",
                &[&date, &state, &city],
            )
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn distinct_states(&self) -> Result<Vec<String>> {
        let rows = self
            .client()?
            .query("SELECT DISTINCT state FROM covid_data", &[])
            .await?;
        rows.iter()
            .map(|row| row.try_get("state").map_err(BenchError::from))
            .collect()
    }

    async fn cases_in_state(&self, state: &str) -> Result<Vec<CaseRecord>> {
        let rows = self
            .client()?
            .query("SELECT * FROM covid_data WHERE state = $1", &[&state])
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn totals_between(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<RangeTotals>> {
        let row = self
            .client()?
            .query_one(
                "SELECT COALESCE(SUM(confirmed), 0)::bigint AS confirmed, \
                        COALESCE(SUM(deaths), 0)::bigint AS deaths \
                 FROM covid_data \
                 WHERE date BETWEEN $1 AND $2 AND state = $3 AND city = $4",
                &[&start, &end, &state, &city],
            )
            .await?;
        Ok(vec![RangeTotals {
            confirmed: row.try_get("confirmed")?,
            deaths: row.try_get("deaths")?,
        }])
    }

    async fn averages_between(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<RangeAverages>> {
        let row = self
            .client()?
            .query_one(
                "SELECT COALESCE(AVG(confirmed), 0)::double precision AS confirmed, \
                        COALESCE(AVG(deaths), 0)::double precision AS deaths \
                 FROM covid_data \
                 WHERE date BETWEEN $1 AND $2 AND state = $3 AND city = $4",
                &[&start, &end, &state, &city],
            )
            .await?;
        Ok(vec![RangeAverages {
            confirmed: row.try_get("confirmed")?,
            deaths: row.try_get("deaths")?,
        }])
    }
}

impl PostgreSQL {
    pub fn new(dsn: String, connect_timeout: Duration) -> Self {
        PostgreSQL {
            dsn,
            connect_timeout,
            client: None,
            _connection: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or(BenchError::NotConnected("PostgreSQL"))
    }
}

fn record_from_row(row: &Row) -> Result<CaseRecord> {
    Ok(CaseRecord {
        date: row.try_get("date")?,
        state: row.try_get("state")?,
        city: row.try_get("city")?,
        place_type: row.try_get("place_type")?,
        confirmed: row.try_get("confirmed")?,
        deaths: row.try_get("deaths")?,
        is_last: row.try_get("is_last")?,
        estimated_population: row.try_get("estimated_population")?,
        city_ibge_code: row.try_get("city_ibge_code")?,
        confirmed_per_100k_inhabitants: row.try_get("confirmed_per_100k_inhabitants")?,
        death_rate: row.try_get("death_rate")?,
    })
}
