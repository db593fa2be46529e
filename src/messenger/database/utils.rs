use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::Row;

/// Parses a timestamp column stored either as INTEGER milliseconds or as a
/// TEXT datetime.
///
/// Rows written by this crate always use milliseconds, but rows imported from
/// the storefront database (or inserted by hand with `CURRENT_TIMESTAMP`)
/// carry SQLite's text format, so both are accepted.
pub(crate) fn parse_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<DateTime<Utc>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    if let Ok(timestamp_ms) = row.try_get::<i64, _>(column_name) {
        return DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or_else(|| column_decode_error(column_name, "Invalid timestamp value"));
    }

    if let Ok(datetime_str) = row.try_get::<String, _>(column_name) {
        return parse_datetime_string(&datetime_str)
            .ok_or_else(|| {
                column_decode_error(
                    column_name,
                    &format!("Could not parse datetime string: '{}'", datetime_str),
                )
            });
    }

    Err(column_decode_error(
        column_name,
        "Could not parse as INTEGER or DATETIME",
    ))
}

fn parse_datetime_string(datetime_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Some(dt.with_timezone(&Utc));
    }

    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
    for format in FORMATS {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(datetime_str, format) {
            return Some(naive_dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(datetime_str, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive_dt| naive_dt.and_utc())
}

/// Parses a TEXT column holding a UUID.
pub(crate) fn parse_uuid<'r, R>(row: &'r R, column_name: &'r str) -> Result<uuid::Uuid, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    let raw: String = row.try_get(column_name)?;
    uuid::Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn column_decode_error(column_name: &str, message: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.to_string(),
        )),
    }
}
