//! Read path: availability checks and dashboard queries. Everything here is
//! lock-light — property reads take the shared lock, ledger scans go through
//! the sorted per-property index.

use ulid::Ulid;

use super::{availability, Engine, EngineError};
use crate::limits;
use crate::model::*;

impl Engine {
    /// How many rooms are free for the stay, and if none, when the property
    /// next frees up.
    ///
    /// An empty range (`check_in == check_out`) books no nights and blocks
    /// nothing, so it reports the property's full capacity.
    pub async fn check_availability(
        &self,
        property_id: Ulid,
        stay: StayRange,
    ) -> Result<AvailabilityReport, EngineError> {
        if stay.check_in > stay.check_out {
            return Err(EngineError::InvalidStay("check-out must not precede check-in"));
        }
        if stay.check_in < limits::min_valid_date() || stay.check_out > limits::max_valid_date() {
            return Err(EngineError::InvalidStay("dates out of supported range"));
        }
        if stay.nights() > limits::MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::InvalidStay("query window too wide"));
        }

        let arc = self
            .get_property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        let max_rooms = arc.read().await.max_rooms;
        metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL).increment(1);

        let booked = self.ledger.confirmed_rooms(&property_id, &stay, None);
        let free = availability::free_rooms(max_rooms, booked);
        if free > 0 {
            return Ok(AvailabilityReport { available_rooms: free, next_available_date: None });
        }

        let next_check_in = self
            .ledger
            .next_confirmed_from(&property_id, stay.check_out)
            .map(|b| b.stay.check_in);
        Ok(AvailabilityReport {
            available_rooms: 0,
            next_available_date: Some(availability::next_available_date(
                stay.check_out,
                next_check_in,
            )),
        })
    }

    pub async fn property_by_id(&self, id: Ulid) -> Option<Property> {
        let arc = self.get_property(&id)?;
        let guard = arc.read().await;
        Some(guard.clone())
    }

    pub async fn property_by_slug(&self, slug: &str) -> Option<Property> {
        let id = self.property_id_by_slug(slug)?;
        self.property_by_id(id).await
    }

    /// All properties, newest first.
    pub async fn list_properties(&self) -> Vec<Property> {
        let arcs: Vec<_> = self.properties.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for arc in arcs {
            out.push(arc.read().await.clone());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// A user's bookings as dashboard rows, newest first. Orphaned bookings
    /// keep their row with a placeholder name.
    pub async fn bookings_for_user(&self, user_id: Ulid) -> Vec<BookingRow> {
        let mut bookings = self.ledger.for_user(&user_id);
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.to_rows(bookings).await
    }

    /// Most recent bookings across all properties, for the admin dashboard.
    pub async fn recent_bookings(&self, limit: usize) -> Vec<BookingRow> {
        self.to_rows(self.ledger.recent(limit)).await
    }

    /// Full booking history for one property, newest first. The property
    /// must still exist; its ledger entries always do.
    pub async fn bookings_for_property(
        &self,
        property_id: Ulid,
    ) -> Result<Vec<BookingRow>, EngineError> {
        if !self.properties.contains_key(&property_id) {
            return Err(EngineError::PropertyNotFound(property_id));
        }
        let mut bookings = self.ledger.for_property(&property_id);
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(self.to_rows(bookings).await)
    }

    async fn to_rows(&self, bookings: Vec<Booking>) -> Vec<BookingRow> {
        let mut rows = Vec::with_capacity(bookings.len());
        for b in bookings {
            let property_name = match self.property_by_id(b.property_id).await {
                Some(p) => p.name,
                None => "Unknown Property".to_string(),
            };
            rows.push(BookingRow {
                id: b.id,
                property_id: b.property_id,
                property_name,
                guest_name: b.guest.name,
                stay: b.stay,
                status: b.status,
                total_price: b.total_price,
                payment_id: b.payment_id,
                created_at: b.created_at,
            });
        }
        rows
    }
}
