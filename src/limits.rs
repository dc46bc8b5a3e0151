//! Hard limits on ledger and inventory size. Exceeding any of these surfaces
//! as `EngineError::LimitExceeded` with the static message.

use chrono::NaiveDate;

pub const MAX_PROPERTIES: usize = 100_000;
pub const MAX_BOOKINGS_PER_PROPERTY: usize = 50_000;

/// Per-property inventory caps. Together with `MAX_BOOKINGS_PER_PROPERTY`
/// they bound the room sums in availability math well inside `u32`.
pub const MAX_ROOMS_PER_PROPERTY: u32 = 1_000;
pub const MAX_GUESTS_PER_ROOM: u32 = 100;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LOCATION_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 8_192;
pub const MAX_NOTES_LEN: usize = 2_048;
pub const MAX_CONTACT_FIELD_LEN: usize = 256;

/// Longest bookable stay.
pub const MAX_STAY_NIGHTS: i64 = 366;

/// Widest availability query window in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 730;

/// Calendar dates the ledger will accept.
pub fn min_valid_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("static date")
}

pub fn max_valid_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2100, 1, 1).expect("static date")
}
