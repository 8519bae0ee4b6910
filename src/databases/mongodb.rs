use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};
use futures::stream::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, InsertManyOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::error;

use super::database::Database;
use crate::error::{BenchError, Result};
use crate::model::{CaseRecord, RangeAverages, RangeTotals};

const DATABASE: &str = "bigdata";
const COLLECTION: &str = "covid_data";

pub struct MongoDB {
    uri: String,
    connect_timeout: Duration,
    client: Option<Client>,
}

#[async_trait]
impl Database for MongoDB {
    fn name(&self) -> &'static str {
        "MongoDB"
    }

    async fn connect(&mut self) -> Result<()> {
        let mut client_options = ClientOptions::parse(&self.uri).await?;
        client_options.connect_timeout = Some(self.connect_timeout);
        client_options.server_selection_timeout = Some(self.connect_timeout);
        let client = Client::with_options(client_options)?;
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        // The collection itself is created on first insert; the natural key
        // is the unique compound index.
        let index_model = IndexModel::builder()
            .keys(doc! { "date": 1, "city": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.records()?.create_index(index_model, None).await?;
        Ok(())
    }

    async fn load_records(&self, batch_size: usize, records: &[CaseRecord]) -> Result<usize> {
        let collection = self.records()?;
        let options = InsertManyOptions::builder().ordered(false).build();

        let mut loaded = 0;
        for chunk in records.chunks(batch_size.max(1)) {
            match collection.insert_many(chunk, options.clone()).await {
                Ok(result) => loaded += result.inserted_ids.len(),
                Err(err) => match &*err.kind {
                    ErrorKind::BulkWrite(failure) => {
                        let write_errors = failure.write_errors.as_deref().unwrap_or_default();
                        for write_error in write_errors {
                            error!(
                                "MongoDB: skipping row {:?}: {}",
                                chunk.get(write_error.index),
                                write_error.message
                            );
                        }
                        loaded += chunk.len() - write_errors.len();
                    }
                    _ => error!("MongoDB: batch of {} rows failed: {err}", chunk.len()),
                },
            }
        }
        Ok(loaded)
    }

    async fn cases_at(&self, date: &str, state: &str, city: &str) -> Result<Vec<CaseRecord>> {
        let filter = doc! { "date": date, "state": state, "city": city };
        let cursor = self.records()?.find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn distinct_states(&self) -> Result<Vec<String>> {
        let values = self.records()?.distinct("state", None, None).await?;
        Ok(values
            .iter()
            .filter_map(|value| value.as_str().map(str::to_owned))
            .collect())
    }

    async fn cases_in_state(&self, state: &str) -> Result<Vec<CaseRecord>> {
        let cursor = self.records()?.find(doc! { "state": state }, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn totals_between(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<RangeTotals>> {
        let docs = self.range_scan(start, end, state, city).await?;
        let (confirmed, _) = sum_field(&docs, "confirmed");
        let (deaths, _) = sum_field(&docs, "deaths");
        Ok(vec![RangeTotals { confirmed, deaths }])
    }

    async fn averages_between(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<RangeAverages>> {
        let docs = self.range_scan(start, end, state, city).await?;
        let (confirmed_sum, confirmed_count) = sum_field(&docs, "confirmed");
        let (deaths_sum, deaths_count) = sum_field(&docs, "deaths");
        Ok(vec![RangeAverages {
            confirmed: average(confirmed_sum, confirmed_count),
            deaths: average(deaths_sum, deaths_count),
        }])
    }
}

impl MongoDB {
    pub fn new(uri: String, connect_timeout: Duration) -> Self {
        MongoDB {
            uri,
            connect_timeout,
            client: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or(BenchError::NotConnected("MongoDB"))
    }

    fn records(&self) -> Result<Collection<CaseRecord>> {
        Ok(self.client()?.database(DATABASE).collection(COLLECTION))
    }

    fn documents(&self) -> Result<Collection<Document>> {
        Ok(self.client()?.database(DATABASE).collection(COLLECTION))
    }

    /// Fetches only the two counters for every record in the range, the
    /// aggregation itself happens client-side.
    async fn range_scan(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<Document>> {
        let filter = doc! {
            "date": { "$gte": start, "$lte": end },
            "state": state,
            "city": city,
        };
        let options = FindOptions::builder()
            .projection(doc! { "_id": 0, "confirmed": 1, "deaths": 1 })
            .build();
        let cursor = self.documents()?.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

/// Sums an optional integer field, ignoring documents where it is null or
/// missing. Returns the sum together with how many documents carried a value.
fn sum_field(docs: &[Document], field: &str) -> (i64, i64) {
    let mut sum = 0;
    let mut count = 0;
    for doc in docs {
        if let Ok(value) = doc.get_i64(field) {
            sum += value;
            count += 1;
        }
    }
    (sum, count)
}

fn average(sum: i64, count: i64) -> f64 {
    if count > 0 {
        sum as f64 / count as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    #[test]
    fn sum_skips_null_and_missing_counters() {
        let docs = vec![
            doc! { "confirmed": 10_i64, "deaths": 1_i64 },
            doc! { "confirmed": Bson::Null, "deaths": 2_i64 },
            doc! { "deaths": 3_i64 },
        ];
        assert_eq!(sum_field(&docs, "confirmed"), (10, 1));
        assert_eq!(sum_field(&docs, "deaths"), (6, 3));
    }

    #[test]
    fn empty_range_aggregates_to_zero() {
        let docs: Vec<Document> = Vec::new();
        let (sum, count) = sum_field(&docs, "confirmed");
        assert_eq!(sum, 0);
        assert_eq!(average(sum, count), 0.0);
    }

    #[test]
    fn absent_counters_are_stored_as_null() {
        let record = CaseRecord {
            date: "2020-06-01".into(),
            state: "PR".into(),
            city: "Curitiba".into(),
            place_type: "city".into(),
            confirmed: None,
            deaths: Some(4),
            is_last: true,
            estimated_population: None,
            city_ibge_code: Some(4106902),
            confirmed_per_100k_inhabitants: None,
            death_rate: Some(0.02),
        };
        let doc = bson::to_document(&record).expect("record serializes to BSON");
        assert_eq!(doc.get("confirmed"), Some(&Bson::Null));
        assert_eq!(doc.get("deaths"), Some(&Bson::Int64(4)));
        assert_eq!(doc.get("is_last"), Some(&Bson::Boolean(true)));
    }
}
