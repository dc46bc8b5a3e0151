use chrono::{Days, NaiveDate};

use crate::model::*;

// ── Availability math ────────────────────────────────────────────
//
// Everything here is pure; the engine feeds it ledger snapshots taken under
// the property lock.

/// Sum of rooms held by Confirmed bookings overlapping `range`, skipping
/// `exclude` when a booking is being re-validated against its peers.
pub fn booked_rooms(bookings: &[Booking], range: &StayRange, exclude: Option<ulid::Ulid>) -> u32 {
    bookings
        .iter()
        .filter(|b| Some(b.id) != exclude && b.blocks(range))
        .map(|b| b.capacity.rooms)
        .sum()
}

/// Rooms still free once `booked` are taken. Never negative — an overbooked
/// ledger (possible before the capacity re-check existed) floors at zero.
pub fn free_rooms(max_rooms: u32, booked: u32) -> u32 {
    max_rooms.saturating_sub(booked)
}

/// Best-effort suggestion for when the property frees up, given the
/// earliest Confirmed booking starting at or after the requested check-out.
///
/// No future booking → the property is open from the requested check-out.
/// Otherwise the day before that booking begins. This only finds a
/// qualitatively free gap; it does not re-check that the gap holds the room
/// count the caller originally asked for.
pub fn next_available_date(
    requested_check_out: NaiveDate,
    next_confirmed_check_in: Option<NaiveDate>,
) -> NaiveDate {
    match next_confirmed_check_in {
        None => requested_check_out,
        Some(check_in) => check_in
            .checked_sub_days(Days::new(1))
            .unwrap_or(requested_check_out),
    }
}

/// Total price locked in at booking time: nightly price × rooms × nights,
/// less the flat percentage discount. Integer minor-unit arithmetic,
/// rounding down.
pub fn quote_total(price: u64, discount: u8, rooms: u32, nights: i64) -> u64 {
    let nights = nights.max(0) as u128;
    let gross = price as u128 * rooms as u128 * nights;
    let net = gross * (100 - discount.min(100) as u128) / 100;
    net as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn confirmed(check_in: &str, check_out: &str, rooms: u32) -> Booking {
        Booking {
            id: Ulid::new(),
            property_id: Ulid::new(),
            user_id: None,
            stay: StayRange::new(d(check_in), d(check_out)),
            capacity: Capacity { adults: 1, children: 0, rooms },
            guest: GuestContact {
                name: "G".into(),
                email: "g@example.com".into(),
                phone: "0".into(),
            },
            status: BookingStatus::Confirmed,
            total_price: 0,
            order_id: String::new(),
            payment_id: String::new(),
            notes: String::new(),
            created_at: 0,
        }
    }

    #[test]
    fn counts_overlapping_confirmed_rooms() {
        let bookings = vec![
            confirmed("2024-06-01", "2024-06-05", 2),
            confirmed("2024-06-04", "2024-06-08", 1),
            confirmed("2024-06-10", "2024-06-12", 3), // outside
        ];
        let query = StayRange::new(d("2024-06-03"), d("2024-06-06"));
        assert_eq!(booked_rooms(&bookings, &query, None), 3);
    }

    #[test]
    fn partial_availability_counts_remaining_rooms() {
        // 3 rooms total, 2 confirmed for [06-01, 06-05); query [06-03, 06-04)
        // leaves exactly 1 room.
        let bookings = vec![confirmed("2024-06-01", "2024-06-05", 2)];
        let query = StayRange::new(d("2024-06-03"), d("2024-06-04"));
        let booked = booked_rooms(&bookings, &query, None);
        assert_eq!(free_rooms(3, booked), 1);
    }

    #[test]
    fn empty_calendar_is_fully_free() {
        let query = StayRange::new(d("2024-06-10"), d("2024-06-12"));
        assert_eq!(free_rooms(3, booked_rooms(&[], &query, None)), 3);
    }

    #[test]
    fn overbooked_ledger_floors_at_zero() {
        assert_eq!(free_rooms(2, 5), 0);
    }

    #[test]
    fn exclude_skips_the_booking_itself() {
        let b = confirmed("2024-06-01", "2024-06-05", 2);
        let id = b.id;
        let query = StayRange::new(d("2024-06-01"), d("2024-06-05"));
        assert_eq!(booked_rooms(&[b.clone()], &query, Some(id)), 0);
        assert_eq!(booked_rooms(&[b], &query, None), 2);
    }

    #[test]
    fn next_date_with_no_future_bookings() {
        assert_eq!(
            next_available_date(d("2024-06-12"), None),
            d("2024-06-12")
        );
    }

    #[test]
    fn next_date_is_day_before_next_booking() {
        assert_eq!(
            next_available_date(d("2024-06-12"), Some(d("2024-06-20"))),
            d("2024-06-19")
        );
    }

    #[test]
    fn quote_basic() {
        // 12_000 minor units × 2 rooms × 4 nights = 96_000
        assert_eq!(quote_total(12_000, 0, 2, 4), 96_000);
    }

    #[test]
    fn quote_applies_discount() {
        // 10% off 96_000 = 86_400
        assert_eq!(quote_total(12_000, 10, 2, 4), 86_400);
    }

    #[test]
    fn quote_rounds_down() {
        // 999 × 1 × 1 at 10% off = 899.1 → 899
        assert_eq!(quote_total(999, 10, 1, 1), 899);
    }

    #[test]
    fn quote_zero_nights_is_free() {
        assert_eq!(quote_total(12_000, 0, 2, 0), 0);
        assert_eq!(quote_total(12_000, 0, 2, -3), 0);
    }

    #[test]
    fn quote_full_discount() {
        assert_eq!(quote_total(12_000, 100, 2, 4), 0);
    }
}
