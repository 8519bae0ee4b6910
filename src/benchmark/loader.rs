use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::{error, info};

use crate::error::Result;
use crate::model::CaseRecord;

/// Reads the whole CSV export into memory so both backends load the same
/// record set. A row that fails to parse is logged with its raw content and
/// skipped, it never stops the load.
pub fn read_records(path: &Path) -> Result<Vec<CaseRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                error!("skipping unreadable CSV row: {err}");
                skipped += 1;
                continue;
            }
        };
        match row.deserialize::<RawRecord>(Some(&headers)) {
            Ok(raw) => records.push(raw.into()),
            Err(err) => {
                error!("skipping malformed CSV row {row:?}: {err}");
                skipped += 1;
            }
        }
    }

    info!(
        "{}: {} case records parsed, {} skipped",
        path.display(),
        records.len(),
        skipped
    );
    Ok(records)
}

/// CSV-shaped view of a record: empty numeric columns mean absent, `is_last`
/// is a loosely-typed boolean, decimals carry publication noise beyond two
/// places.
#[derive(Debug, Deserialize)]
struct RawRecord {
    date: String,
    state: String,
    city: String,
    place_type: String,
    confirmed: Option<i64>,
    deaths: Option<i64>,
    #[serde(deserialize_with = "truthy")]
    is_last: bool,
    estimated_population: Option<i64>,
    city_ibge_code: Option<i64>,
    #[serde(deserialize_with = "rounded")]
    confirmed_per_100k_inhabitants: Option<f64>,
    #[serde(deserialize_with = "rounded")]
    death_rate: Option<f64>,
}

impl From<RawRecord> for CaseRecord {
    fn from(raw: RawRecord) -> Self {
        CaseRecord {
            date: raw.date,
            state: raw.state,
            city: raw.city,
            place_type: raw.place_type,
            confirmed: raw.confirmed,
            deaths: raw.deaths,
            is_last: raw.is_last,
            estimated_population: raw.estimated_population,
            city_ibge_code: raw.city_ibge_code,
            confirmed_per_100k_inhabitants: raw.confirmed_per_100k_inhabitants,
            death_rate: raw.death_rate,
        }
    }
}

/// "true" in any casing is true, everything else (including empty) is false.
fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().eq_ignore_ascii_case("true"))
}

/// Optional decimal, rounded to two places. Empty means absent, not zero.
fn rounded<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => {
            let value: f64 = text.parse().map_err(serde::de::Error::custom)?;
            Ok(Some((value * 100.0).round() / 100.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HEADER: &str = "date,state,city,place_type,confirmed,deaths,is_last,\
         estimated_population,city_ibge_code,confirmed_per_100k_inhabitants,death_rate";

    fn write_csv(dir: &TempDir, rows: &[&str]) -> PathBuf {
        let path = dir.path().join("cases.csv");
        let mut contents = String::from(HEADER);
        for row in rows {
            contents.push('\n');
            contents.push_str(row);
        }
        std::fs::write(&path, contents).expect("unable to write CSV fixture");
        path
    }

    #[test]
    fn empty_numeric_columns_parse_as_absent() {
        let dir = TempDir::new().expect("unable to create temporary working directory");
        let path = write_csv(&dir, &["2020-06-01,PR,Curitiba,city,,,True,,,,"]);

        let records = read_records(&path).expect("CSV should load");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.confirmed, None);
        assert_eq!(record.deaths, None);
        assert_eq!(record.estimated_population, None);
        assert_eq!(record.city_ibge_code, None);
        assert_eq!(record.confirmed_per_100k_inhabitants, None);
        assert_eq!(record.death_rate, None);
    }

    #[test]
    fn is_last_matches_true_case_insensitively() {
        let dir = TempDir::new().expect("unable to create temporary working directory");
        let path = write_csv(
            &dir,
            &[
                "2020-06-01,PR,Curitiba,city,1,0,TRUE,10,1,0.5,0.0",
                "2020-06-02,PR,Curitiba,city,1,0,true,10,1,0.5,0.0",
                "2020-06-03,PR,Curitiba,city,1,0,false,10,1,0.5,0.0",
                "2020-06-04,PR,Curitiba,city,1,0,yes,10,1,0.5,0.0",
                "2020-06-05,PR,Curitiba,city,1,0,,10,1,0.5,0.0",
            ],
        );

        let records = read_records(&path).expect("CSV should load");
        let flags: Vec<bool> = records.iter().map(|r| r.is_last).collect();
        assert_eq!(flags, vec![true, true, false, false, false]);
    }

    #[test]
    fn decimals_are_rounded_to_two_places() {
        let dir = TempDir::new().expect("unable to create temporary working directory");
        let path = write_csv(&dir, &["2020-06-01,PR,Curitiba,city,7,2,true,100,1,12.3456,0.285714"]);

        let records = read_records(&path).expect("CSV should load");
        assert_eq!(records[0].confirmed_per_100k_inhabitants, Some(12.35));
        assert_eq!(records[0].death_rate, Some(0.29));
        assert_eq!(records[0].confirmed, Some(7));
        assert_eq!(records[0].deaths, Some(2));
    }

    #[test]
    fn malformed_row_does_not_stop_the_load() {
        let dir = TempDir::new().expect("unable to create temporary working directory");
        let path = write_csv(
            &dir,
            &[
                "2020-06-01,PR,Curitiba,city,3,1,true,100,1,1.0,0.1",
                "2020-06-02,PR,Curitiba,city,not-a-number,1,true,100,1,1.0,0.1",
                "2020-06-03,PR,Curitiba,city,5,1,true,100,1,1.0,0.1",
            ],
        );

        let records = read_records(&path).expect("CSV should load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "2020-06-01");
        assert_eq!(records[1].date, "2020-06-03");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_records(Path::new("does-not-exist.csv")).is_err());
    }
}
