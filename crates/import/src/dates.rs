use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::ImportError;

/// Parse an OFX date token into a naive timestamp.
///
/// Accepted shapes: `YYYYMMDD`, `YYYYMMDDHHMMSS`, optionally followed by
/// fractional seconds and a bracketed timezone annotation, e.g.
/// `20241205120000.000[-5:EST]`. The annotation is stripped, not
/// converted; producers disagree on its meaning and statement-local time
/// is what banks display.
///
/// Anything else fails with `MalformedDate`; there is no "current time"
/// fallback, callers decide whether a bad date skips the record or aborts
/// the batch.
pub fn parse_ofx_datetime(raw: &str) -> Result<NaiveDateTime, ImportError> {
    let token = raw.trim();
    let token = match token.find('[') {
        Some(idx) => &token[..idx],
        None => token,
    };

    let malformed = || ImportError::MalformedDate(raw.trim().to_string());

    if let Some(compact) = token.get(..14) {
        return NaiveDateTime::parse_from_str(compact, "%Y%m%d%H%M%S").map_err(|_| malformed());
    }
    if let Some(day) = token.get(..8) {
        return NaiveDate::parse_from_str(day, "%Y%m%d")
            .map(|d| d.and_time(NaiveTime::MIN))
            .map_err(|_| malformed());
    }
    Err(malformed())
}
