use std::path::Path;

use chrono::{DateTime, Utc};

use crate::{LogsViewerError, LogsViewerResult};

use super::TIMESTAMP_FILENAME;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses the gather time written by must-gather.
///
/// The value is a wall-clock time with offset and zone abbreviation, optionally followed by a
/// monotonic clock reading, e.g. `2024-03-01 08:00:00.123456789 +0000 UTC m=+0.004512`. Only the
/// first line is read.
pub fn parse_gather_timestamp(text: &str) -> LogsViewerResult<DateTime<Utc>> {
    let line = text.lines().next().unwrap_or_default().trim();
    let invalid = || LogsViewerError::InvalidTimestamp(line.to_string());

    let mut fields = line.split_whitespace();
    let (Some(date), Some(time), Some(offset)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(invalid());
    };

    // Zone abbreviation, then the monotonic reading
    let rest: Vec<&str> = fields.collect();
    match rest.as_slice() {
        [] => {}
        [zone] if !zone.starts_with("m=") => {}
        [zone, monotonic] if !zone.starts_with("m=") && monotonic.starts_with("m=") => {}
        _ => return Err(invalid()),
    }

    DateTime::parse_from_str(&format!("{date} {time} {offset}"), "%Y-%m-%d %H:%M:%S%.f %z")
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid())
}

/// Reads and parses the `timestamp` file extracted into `dir`.
pub async fn read_gather_timestamp(dir: impl AsRef<Path>) -> LogsViewerResult<DateTime<Utc>> {
    let path = dir.as_ref().join(TIMESTAMP_FILENAME);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LogsViewerError::TimestampMissing(path))
        }
        Err(e) => return Err(e.into()),
    };

    parse_gather_timestamp(&text)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_parse_with_monotonic_reading() -> anyhow::Result<()> {
        let parsed = parse_gather_timestamp("2024-03-01 08:00:00.5 +0200 EET m=+0.004512\n")?;
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
            + chrono::Duration::milliseconds(500);
        assert_eq!(parsed, expected);
        Ok(())
    }

    #[test]
    fn test_parse_without_monotonic_reading() -> anyhow::Result<()> {
        let parsed = parse_gather_timestamp("2024-03-01 08:00:00.000000001 +0000 UTC")?;
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::nanoseconds(1)
        );
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "yesterday", "2024-03-01 08:00:00.0 +0000 UTC bogus", "2024-13-01 08:00:00.0 +0000 UTC"] {
            assert!(
                matches!(parse_gather_timestamp(text), Err(LogsViewerError::InvalidTimestamp(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_timestamp_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let result = read_gather_timestamp(temp_dir.path()).await;
        assert!(matches!(result, Err(LogsViewerError::TimestampMissing(_))));
        Ok(())
    }
}
