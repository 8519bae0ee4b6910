use std::future::Future;

use tokio::time::Instant;
use tracing::{error, info};

use crate::databases::database::Database;
use crate::error::Result;
use crate::model::CaseRecord;

const DESCRIPTION_WIDTH: usize = 60;
const COUNT_WIDTH: usize = 17;
const DURATION_WIDTH: usize = 8;

// Canned benchmark parameters, chosen so every query touches data present in
// the full caso_full dataset.
const LOOKUP_DATE: &str = "2020-06-01";
const PLACE_STATE: &str = "PR";
const PLACE_CITY: &str = "Curitiba";
const LISTING_STATE: &str = "AC";
const TOTALS_RANGE: (&str, &str) = ("2020-03-01", "2020-03-31");
const AVERAGES_RANGE: (&str, &str) = ("2020-06-01", "2020-06-30");

/// Runs one named query, measuring wall-clock time and logging the
/// fixed-width benchmark line. A failing query is logged and swallowed so the
/// remaining benchmarks still run.
pub async fn run_benchmark<T, F, Fut>(description: &str, query: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let start = Instant::now();
    match query().await {
        Ok(rows) => {
            let duration = start.elapsed().as_millis();
            info!("{}", benchmark_line(description, rows.len(), duration));
        }
        Err(err) => error!("benchmark '{description}' failed: {err}"),
    }
}

/// The six canned read benchmarks, identical for every backend.
pub async fn run_suite(db: &dyn Database) {
    let name = db.name();
    run_benchmark(
        &format!("{name}: Casos confirmados em uma cidade em uma data específica"),
        || db.cases_at(LOOKUP_DATE, PLACE_STATE, PLACE_CITY),
    )
    .await;
    run_benchmark(&format!("{name}: Estados distintos presentes na base"), || {
        db.distinct_states()
    })
    .await;
    run_benchmark(
        &format!("{name}: Casos registrados por cidade dentro de um estado"),
        || db.cases_in_state(LISTING_STATE),
    )
    .await;
    run_benchmark(
        &format!("{name}: Mortes em uma cidade em uma data específica"),
        || db.cases_at(LOOKUP_DATE, PLACE_STATE, PLACE_CITY),
    )
    .await;
    run_benchmark(
        &format!("{name}: Total de casos e mortes em um período"),
        || db.totals_between(TOTALS_RANGE.0, TOTALS_RANGE.1, PLACE_STATE, PLACE_CITY),
    )
    .await;
    run_benchmark(
        &format!("{name}: Média de casos e mortes em um período"),
        || db.averages_between(AVERAGES_RANGE.0, AVERAGES_RANGE.1, PLACE_STATE, PLACE_CITY),
    )
    .await;
}

/// One whole backend run: connect, ensure the schema, timed bulk load, the
/// benchmark suite, disconnect. Schema failures are logged and tolerated, the
/// table may already exist in usable form.
pub async fn run_pipeline(
    db: &mut dyn Database,
    records: &[CaseRecord],
    batch_size: usize,
) -> Result<()> {
    db.connect().await?;

    info!("{}: preparing the covid_data schema", db.name());
    if let Err(err) = db.ensure_schema().await {
        error!(
            "{}: schema setup failed, assuming an existing usable table: {err}",
            db.name()
        );
    }

    info!("{}: loading {} case records", db.name(), records.len());
    let start = Instant::now();
    let loaded = db.load_records(batch_size, records).await?;
    info!(
        "{}: loaded {} of {} records in {:.2?}",
        db.name(),
        loaded,
        records.len(),
        start.elapsed()
    );

    info!("{}: running benchmarks", db.name());
    run_suite(&*db).await;

    db.disconnect().await
}

fn benchmark_line(description: &str, count: usize, duration_ms: u128) -> String {
    format!(
        "   {description:<dw$} {count:>cw$} {duration:>du$}",
        description = description,
        count = count_label(count),
        duration = format!("{duration_ms}ms"),
        dw = DESCRIPTION_WIDTH,
        cw = COUNT_WIDTH,
        du = DURATION_WIDTH,
    )
}

fn count_label(count: usize) -> String {
    if count == 1 {
        "1 registro".to_string()
    } else {
        format!("{count} registros")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;

    #[test]
    fn count_noun_is_singular_only_for_one() {
        assert_eq!(count_label(0), "0 registros");
        assert_eq!(count_label(1), "1 registro");
        assert_eq!(count_label(2), "2 registros");
    }

    #[test]
    fn benchmark_line_uses_fixed_widths() {
        let line = benchmark_line("Consulta", 1, 42);
        // 3 spaces + 60 + separator + 17 + separator + 8
        assert_eq!(line.len(), 3 + 60 + 1 + 17 + 1 + 8);
        assert!(line.starts_with("   Consulta "));
        assert!(line.contains("       1 registro"));
        assert!(line.ends_with("    42ms"));
    }

    #[test]
    fn long_descriptions_are_not_truncated() {
        let description = "d".repeat(80);
        let line = benchmark_line(&description, 3, 7);
        assert!(line.contains(&description));
        assert!(line.ends_with("     7ms"));
    }

    #[tokio::test]
    async fn failing_query_is_caught() {
        // Must return normally, a failing benchmark never aborts the run.
        run_benchmark("broken", || async {
            Err::<Vec<()>, _>(BenchError::NotConnected("nowhere"))
        })
        .await;
    }
}
