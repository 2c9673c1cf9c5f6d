//! SQLite glue: run one statement into a bounded text grid, classify
//! failures, and the synchronous one-shot query path.

use std::thread;
use std::time::{Duration, Instant};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};

use crate::config::{Config, GridLimits};
use crate::error::{Error, Result};
use crate::registry::{DbHandle, HandleRegistry};

/// Rows of column text, in step order.
pub type ResultGrid = Vec<Vec<String>>;

/// Pause between busy retries on the synchronous path.
const BUSY_BACKOFF: Duration = Duration::from_millis(1);

/// Whether `err` is one of the engine's transient "try again" statuses.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Prepare `query` and step it to completion.
///
/// With `capture` set, up to `limits.max_rows` rows of up to
/// `limits.max_columns` columns are kept. Stepping always runs to the end so
/// writes take full effect even when nothing is captured.
pub(crate) fn run_query(
    conn: &Connection,
    query: &str,
    capture: bool,
    limits: GridLimits,
) -> rusqlite::Result<ResultGrid> {
    let mut stmt = conn.prepare(query)?;
    let columns = stmt.column_count().min(limits.max_columns);
    let mut rows = stmt.raw_query();
    let mut grid = ResultGrid::new();

    while let Some(row) = rows.next()? {
        if !capture || grid.len() >= limits.max_rows {
            continue;
        }
        let mut values = Vec::with_capacity(columns);
        for index in 0..columns {
            values.push(column_text(row.get_ref(index)?));
        }
        grid.push(values);
    }
    Ok(grid)
}

/// Text rendering of one column value. NULL reads as the empty string.
fn column_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => real_text(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// A REAL as SQLite's own text conversion renders it (`%!.15g`): 15
/// significant digits, always a decimal point, and a signed two-digit
/// exponent outside `1e-4..1e15`.
fn real_text(v: f64) -> String {
    if v == 0.0 {
        return "0.0".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }

    // Rounding to 15 digits can carry into the exponent, so read it back.
    let scientific = format!("{v:.14e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..15).contains(&exponent) {
        let decimals = (14 - exponent) as usize;
        with_point(trim_fraction(&format!("{v:.decimals$}")))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            with_point(trim_fraction(mantissa)),
            exponent.unsigned_abs()
        )
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

fn with_point(digits: &str) -> String {
    if digits.contains('.') {
        digits.to_string()
    } else {
        format!("{digits}.0")
    }
}

/// Run `query` on the caller's thread, retrying busy statuses until
/// `config.busy_timeout` has elapsed.
pub fn query_sync(
    registry: &HandleRegistry,
    handle: DbHandle,
    query: &str,
    config: &Config,
) -> Result<ResultGrid> {
    let conn = registry.get(handle).ok_or(Error::UnknownHandle(handle))?;
    let started = Instant::now();

    loop {
        let result = run_query(&conn.lock(), query, true, config.limits());
        match result {
            Ok(grid) => return Ok(grid),
            Err(err) if is_busy(&err) => {
                if started.elapsed() > config.busy_timeout {
                    return Err(Error::Timeout {
                        query: query.to_string(),
                        message: err.to_string(),
                    });
                }
                thread::sleep(BUSY_BACKOFF);
            }
            Err(err) => {
                return Err(Error::Query {
                    query: query.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }
}
