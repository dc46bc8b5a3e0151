use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// The reservation ledger: every booking ever taken, in every status, plus a
/// per-property index sorted by check-in date so overlap scans can skip
/// everything starting at or after the query's check-out.
///
/// Bookings outlive their property — deleting a listing orphans its rows here
/// rather than cascading.
pub struct Ledger {
    bookings: DashMap<Ulid, Booking>,
    /// property id → (check_in, booking id), sorted by check_in.
    by_property: DashMap<Ulid, Vec<(NaiveDate, Ulid)>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_property: DashMap::new(),
        }
    }

    pub fn insert(&self, booking: Booking) {
        let key = (booking.stay.check_in, booking.id);
        let mut index = self.by_property.entry(booking.property_id).or_default();
        let pos = index.partition_point(|e| *e < key);
        index.insert(pos, key);
        drop(index);
        self.bookings.insert(booking.id, booking);
    }

    pub fn get(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn count_for_property(&self, property_id: &Ulid) -> usize {
        self.by_property.get(property_id).map_or(0, |e| e.len())
    }

    /// Flip a Pending booking to Confirmed, recording the payment references.
    pub fn confirm(&self, id: &Ulid, order_id: &str, payment_id: &str) {
        if let Some(mut b) = self.bookings.get_mut(id) {
            b.status = BookingStatus::Confirmed;
            b.order_id = order_id.to_string();
            b.payment_id = payment_id.to_string();
        }
    }

    pub fn cancel(&self, id: &Ulid) {
        if let Some(mut b) = self.bookings.get_mut(id) {
            b.status = BookingStatus::Cancelled;
        }
    }

    /// All of a property's bookings whose stay overlaps `range`, any status.
    /// The sorted index prunes entries with `check_in >= range.check_out`.
    pub fn overlapping(&self, property_id: &Ulid, range: &StayRange) -> Vec<Booking> {
        if range.is_empty() {
            return Vec::new();
        }
        let Some(index) = self.by_property.get(property_id) else {
            return Vec::new();
        };
        let index = index.value();
        let right = index.partition_point(|(check_in, _)| *check_in < range.check_out);
        index[..right]
            .iter()
            .filter_map(|(_, id)| self.bookings.get(id))
            .filter(|b| b.stay.check_out > range.check_in)
            .map(|b| b.value().clone())
            .collect()
    }

    /// Sum of rooms across Confirmed bookings overlapping `range`, skipping
    /// `exclude` (used when re-checking a booking against its peers).
    pub fn confirmed_rooms(
        &self,
        property_id: &Ulid,
        range: &StayRange,
        exclude: Option<Ulid>,
    ) -> u32 {
        self.overlapping(property_id, range)
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed && Some(b.id) != exclude)
            .map(|b| b.capacity.rooms)
            .sum()
    }

    /// Earliest Confirmed booking with `check_in >= from`, if any.
    pub fn next_confirmed_from(&self, property_id: &Ulid, from: NaiveDate) -> Option<Booking> {
        let index = self.by_property.get(property_id)?;
        let index = index.value();
        let start = index.partition_point(|(check_in, _)| *check_in < from);
        index[start..]
            .iter()
            .filter_map(|(_, id)| self.bookings.get(id))
            .find(|b| b.status == BookingStatus::Confirmed)
            .map(|b| b.value().clone())
    }

    pub fn for_property(&self, property_id: &Ulid) -> Vec<Booking> {
        self.by_property
            .get(property_id)
            .map(|index| {
                index
                    .iter()
                    .filter_map(|(_, id)| self.bookings.get(id))
                    .map(|b| b.value().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn for_user(&self, user_id: &Ulid) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|e| e.value().user_id == Some(*user_id))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Newest bookings first, across all properties.
    pub fn recent(&self, limit: usize) -> Vec<Booking> {
        let mut all: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all.truncate(limit);
        all
    }

    pub fn all(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
