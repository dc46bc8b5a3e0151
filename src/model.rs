use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — used for record timestamps only. Stay dates are
/// calendar dates, not instants.
pub type Ms = i64;

/// Half-open stay interval `[check_in, check_out)`.
///
/// The check-out day itself is free: a stay ending on the 15th and one
/// starting on the 15th do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    /// Number of nights. Zero for an empty range.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn is_empty(&self) -> bool {
        self.check_in >= self.check_out
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        // An empty range books no nights and blocks nothing.
        !self.is_empty()
            && !other.is_empty()
            && self.check_in < other.check_out
            && other.check_in < self.check_out
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

/// Reservation lifecycle. Only `Confirmed` counts against room capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "Pending"),
            BookingStatus::Confirmed => write!(f, "Confirmed"),
            BookingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Requested occupancy for a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub adults: u32,
    pub children: u32,
    pub rooms: u32,
}

impl Capacity {
    /// Total party size. Widened so untrusted counts cannot wrap.
    pub fn guests(&self) -> u64 {
        u64::from(self.adults) + u64::from(self.children)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A bookable inventory record.
///
/// `price` is per room per night in minor currency units; `discount` is a
/// flat percentage (0–100) applied at booking time. `max_guests` is the
/// per-room guest cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: Ulid,
    pub name: String,
    pub slug: String,
    pub price: u64,
    pub discount: u8,
    pub max_rooms: u32,
    pub max_guests: u32,
    pub location: String,
    pub description: String,
    pub available: bool,
    pub created_at: Ms,
}

/// A reservation ledger entry.
///
/// `total_price` is locked in at creation and never recomputed, even if the
/// property's price changes later. `order_id`/`payment_id` stay empty until
/// the payment provider confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub property_id: Ulid,
    pub user_id: Option<Ulid>,
    pub stay: StayRange,
    pub capacity: Capacity,
    pub guest: GuestContact,
    pub status: BookingStatus,
    pub total_price: u64,
    pub order_id: String,
    pub payment_id: String,
    pub notes: String,
    pub created_at: Ms,
}

impl Booking {
    /// Whether this booking occupies rooms on the given range.
    pub fn blocks(&self, range: &StayRange) -> bool {
        self.status == BookingStatus::Confirmed && self.stay.overlaps(range)
    }
}

/// The event types — this is the WAL record format. Creation and update
/// events carry the full record so a compacted log reseeds state with one
/// event per live row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PropertyCreated {
        property: Property,
    },
    PropertyUpdated {
        property: Property,
    },
    PropertyDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingConfirmed {
        id: Ulid,
        order_id: String,
        payment_id: String,
    },
    BookingCancelled {
        id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// What availability checks report back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub available_rooms: u32,
    /// Set only when no rooms are free for the requested range.
    pub next_available_date: Option<NaiveDate>,
}

/// Returned by booking intake once the Pending record and the payment order
/// both exist. `key` is the public payment-integration identifier the client
/// needs to open the payment UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub booking_id: Ulid,
    pub order_id: String,
    pub key: String,
}

/// Flattened booking row for dashboards, joined with the property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRow {
    pub id: Ulid,
    pub property_id: Ulid,
    pub property_name: String,
    pub guest_name: String,
    pub stay: StayRange,
    pub status: BookingStatus,
    pub total_price: u64,
    pub payment_id: String,
    pub created_at: Ms,
}
