use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CaseRecord, RangeAverages, RangeTotals};

/// Capability set every backend pipeline implements: connection setup,
/// schema creation, bulk load, and the canned read queries.
#[async_trait]
pub trait Database {
    fn name(&self) -> &'static str;
    async fn connect(&mut self) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;

    /// Creates the `covid_data` table/collection with its (date, city)
    /// natural key. Idempotent when the schema already exists.
    async fn ensure_schema(&self) -> Result<()>;

    /// Loads the records, skipping and logging individual rows the store
    /// rejects. Returns the number of rows actually stored.
    async fn load_records(&self, batch_size: usize, records: &[CaseRecord]) -> Result<usize>;

    async fn cases_at(&self, date: &str, state: &str, city: &str) -> Result<Vec<CaseRecord>>;
    async fn distinct_states(&self) -> Result<Vec<String>>;
    async fn cases_in_state(&self, state: &str) -> Result<Vec<CaseRecord>>;

    /// Sum of confirmed cases and deaths over a date range at one place.
    /// Always yields exactly one aggregate row, zeroed when nothing matches.
    async fn totals_between(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<RangeTotals>>;

    /// Average confirmed cases and deaths over a date range at one place.
    /// Always yields exactly one aggregate row, zeroed when nothing matches.
    async fn averages_between(
        &self,
        start: &str,
        end: &str,
        state: &str,
        city: &str,
    ) -> Result<Vec<RangeAverages>>;
}
