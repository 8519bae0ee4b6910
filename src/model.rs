use serde::{Deserialize, Serialize};

/// One row of COVID-19 case data for a place and date, as published in the
/// `caso_full` dataset. Optional counters are absent (not zero) when the
/// source column is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub date: String,
    pub state: String,
    pub city: String,
    pub place_type: String,
    pub confirmed: Option<i64>,
    pub deaths: Option<i64>,
    pub is_last: bool,
    pub estimated_population: Option<i64>,
    pub city_ibge_code: Option<i64>,
    pub confirmed_per_100k_inhabitants: Option<f64>,
    pub death_rate: Option<f64>,
}

/// Aggregate row returned by the date-range total query. Zero when the range
/// matches no records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeTotals {
    pub confirmed: i64,
    pub deaths: i64,
}

/// Aggregate row returned by the date-range average query. Zero when the
/// range matches no records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeAverages {
    pub confirmed: f64,
    pub deaths: f64,
}
