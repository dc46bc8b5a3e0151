//! Write path: property CRUD, booking intake, payment confirmation.
//!
//! Every mutation goes WAL-first. The in-memory maps are only touched after
//! the event is durably on disk, so a crash never shows state the log
//! cannot replay.

use ulid::Ulid;

use super::{availability, now_ms, Engine, EngineError};
use crate::limits;
use crate::model::*;
use crate::payment::PaymentGateway;
use crate::slug::unique_slug;

pub struct NewProperty {
    pub name: String,
    pub price: u64,
    pub discount: u8,
    pub max_rooms: u32,
    pub max_guests: u32,
    pub location: String,
    pub description: String,
    pub available: bool,
}

/// Partial property update. `None` fields are left untouched.
#[derive(Default)]
pub struct PropertyEdit {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub discount: Option<u8>,
    pub max_rooms: Option<u32>,
    pub max_guests: Option<u32>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub available: Option<bool>,
}

pub struct BookingRequest {
    pub property_id: Ulid,
    pub user_id: Option<Ulid>,
    pub stay: StayRange,
    pub capacity: Capacity,
    pub guest: GuestContact,
    pub notes: String,
}

fn check_property_fields(
    name: &str,
    price: u64,
    discount: u8,
    max_rooms: u32,
    max_guests: u32,
    location: &str,
    description: &str,
) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidField("property name must not be empty"));
    }
    if name.len() > limits::MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("property name too long"));
    }
    if location.len() > limits::MAX_LOCATION_LEN {
        return Err(EngineError::LimitExceeded("location too long"));
    }
    if description.len() > limits::MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if price == 0 {
        return Err(EngineError::InvalidField("price must be positive"));
    }
    if discount > 100 {
        return Err(EngineError::InvalidField("discount must be 0-100"));
    }
    if max_rooms == 0 {
        return Err(EngineError::InvalidField("property must have at least one room"));
    }
    if max_rooms > limits::MAX_ROOMS_PER_PROPERTY {
        return Err(EngineError::LimitExceeded("too many rooms"));
    }
    if max_guests == 0 {
        return Err(EngineError::InvalidField("guest capacity must be at least one"));
    }
    if max_guests > limits::MAX_GUESTS_PER_ROOM {
        return Err(EngineError::LimitExceeded("per-room guest cap too large"));
    }
    Ok(())
}

fn check_stay(stay: &StayRange) -> Result<(), EngineError> {
    if stay.is_empty() {
        return Err(EngineError::InvalidStay("check-out must be after check-in"));
    }
    if stay.check_in < limits::min_valid_date() || stay.check_out > limits::max_valid_date() {
        return Err(EngineError::InvalidStay("dates out of supported range"));
    }
    if stay.nights() > limits::MAX_STAY_NIGHTS {
        return Err(EngineError::InvalidStay("stay too long"));
    }
    Ok(())
}

fn check_guest(guest: &GuestContact, notes: &str) -> Result<(), EngineError> {
    if guest.name.trim().is_empty() {
        return Err(EngineError::InvalidField("guest name must not be empty"));
    }
    if guest.name.len() > limits::MAX_CONTACT_FIELD_LEN
        || guest.email.len() > limits::MAX_CONTACT_FIELD_LEN
        || guest.phone.len() > limits::MAX_CONTACT_FIELD_LEN
    {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if notes.len() > limits::MAX_NOTES_LEN {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_property(&self, input: NewProperty) -> Result<Property, EngineError> {
        check_property_fields(
            &input.name,
            input.price,
            input.discount,
            input.max_rooms,
            input.max_guests,
            &input.location,
            &input.description,
        )?;
        if self.properties.len() >= limits::MAX_PROPERTIES {
            return Err(EngineError::LimitExceeded("too many properties"));
        }

        let id = Ulid::new();
        // Claim the slug in the index before writing, so two concurrent
        // creates with the same name cannot pick the same one.
        let slug = loop {
            let candidate = unique_slug(&input.name, |s| self.slugs.contains_key(s));
            match self.slugs.entry(candidate.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    v.insert(id);
                    break candidate;
                }
            }
        };

        let property = Property {
            id,
            name: input.name,
            slug: slug.clone(),
            price: input.price,
            discount: input.discount,
            max_rooms: input.max_rooms,
            max_guests: input.max_guests,
            location: input.location,
            description: input.description,
            available: input.available,
            created_at: now_ms(),
        };

        let event = Event::PropertyCreated { property: property.clone() };
        if let Err(e) = self.wal_append(&event).await {
            self.slugs.remove(&slug);
            return Err(e);
        }
        self.properties
            .insert(id, std::sync::Arc::new(tokio::sync::RwLock::new(property.clone())));
        metrics::counter!(crate::observability::PROPERTIES_CREATED_TOTAL).increment(1);
        self.notify.send(id, &event);
        tracing::info!(property = %id, slug = %slug, "property created");
        Ok(property)
    }

    pub async fn update_property(
        &self,
        id: Ulid,
        edit: PropertyEdit,
    ) -> Result<Property, EngineError> {
        let arc = self.get_property(&id).ok_or(EngineError::PropertyNotFound(id))?;
        let mut guard = arc.write().await;

        let mut updated = guard.clone();
        let renamed = match edit.name {
            Some(name) if name != updated.name => {
                updated.name = name;
                true
            }
            _ => false,
        };
        if let Some(price) = edit.price {
            updated.price = price;
        }
        if let Some(discount) = edit.discount {
            updated.discount = discount;
        }
        if let Some(max_rooms) = edit.max_rooms {
            updated.max_rooms = max_rooms;
        }
        if let Some(max_guests) = edit.max_guests {
            updated.max_guests = max_guests;
        }
        if let Some(location) = edit.location {
            updated.location = location;
        }
        if let Some(description) = edit.description {
            updated.description = description;
        }
        if let Some(available) = edit.available {
            updated.available = available;
        }
        check_property_fields(
            &updated.name,
            updated.price,
            updated.discount,
            updated.max_rooms,
            updated.max_guests,
            &updated.location,
            &updated.description,
        )?;

        // Claim the regenerated slug in the index before writing, same as
        // create, so two concurrent renames to one name cannot collide.
        let mut claimed = None;
        if renamed {
            updated.slug = loop {
                let candidate = unique_slug(&updated.name, |s| {
                    self.slugs.get(s).is_some_and(|e| *e.value() != id)
                });
                if candidate == guard.slug {
                    break candidate;
                }
                match self.slugs.entry(candidate.clone()) {
                    dashmap::mapref::entry::Entry::Occupied(_) => continue,
                    dashmap::mapref::entry::Entry::Vacant(v) => {
                        v.insert(id);
                        claimed = Some(candidate.clone());
                        break candidate;
                    }
                }
            };
        }

        let event = Event::PropertyUpdated { property: updated.clone() };
        if let Err(e) = self.wal_append(&event).await {
            if let Some(slug) = claimed {
                self.slugs.remove(&slug);
            }
            return Err(e);
        }
        if guard.slug != updated.slug {
            self.slugs.remove(&guard.slug);
        }
        *guard = updated.clone();
        drop(guard);
        self.notify.send(id, &event);
        tracing::info!(property = %id, "property updated");
        Ok(updated)
    }

    /// Remove a property. Its bookings stay in the ledger as historical
    /// records with no live inventory behind them.
    pub async fn delete_property(&self, id: Ulid) -> Result<(), EngineError> {
        let arc = self.get_property(&id).ok_or(EngineError::PropertyNotFound(id))?;
        let guard = arc.write().await;
        let event = Event::PropertyDeleted { id };
        self.wal_append(&event).await?;
        self.slugs.remove(&guard.slug);
        drop(guard);
        self.properties.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        tracing::info!(property = %id, "property deleted");
        Ok(())
    }

    /// Book a stay: validate under the property's write lock, persist the
    /// Pending booking, then open a payment order for the quoted total.
    ///
    /// The lock is held from the overlap count through the ledger insert, so
    /// two racing requests for the last room cannot both pass validation.
    pub async fn book(
        &self,
        gateway: &dyn PaymentGateway,
        req: BookingRequest,
    ) -> Result<BookingReceipt, EngineError> {
        check_stay(&req.stay)?;
        check_guest(&req.guest, &req.notes)?;
        if req.capacity.rooms == 0 {
            return Err(EngineError::InvalidStay("at least one room is required"));
        }

        let arc = self
            .get_property(&req.property_id)
            .ok_or(EngineError::PropertyNotFound(req.property_id))?;
        let guard = arc.write().await;

        if !guard.available {
            return Err(EngineError::InvalidTransition("property is not accepting bookings"));
        }
        if self.ledger.count_for_property(&req.property_id) >= limits::MAX_BOOKINGS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many bookings for property"));
        }

        let overlapping = self.ledger.overlapping(&req.property_id, &req.stay);
        let booked = availability::booked_rooms(&overlapping, &req.stay, None);
        let free = availability::free_rooms(guard.max_rooms, booked);
        if req.capacity.rooms > free {
            metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::CapacityExceeded { available: free });
        }
        let allowed_guests = u64::from(guard.max_guests) * u64::from(req.capacity.rooms);
        if req.capacity.guests() > allowed_guests {
            metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::GuestLimitExceeded {
                max_guests: allowed_guests,
                rooms: req.capacity.rooms,
            });
        }

        let total = availability::quote_total(
            guard.price,
            guard.discount,
            req.capacity.rooms,
            req.stay.nights(),
        );
        let booking = Booking {
            id: Ulid::new(),
            property_id: req.property_id,
            user_id: req.user_id,
            stay: req.stay,
            capacity: req.capacity,
            guest: req.guest,
            status: BookingStatus::Pending,
            total_price: total,
            order_id: String::new(),
            payment_id: String::new(),
            notes: req.notes,
            created_at: now_ms(),
        };

        let event = Event::BookingCreated { booking: booking.clone() };
        self.wal_append(&event).await?;
        self.ledger.insert(booking.clone());
        drop(guard);
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify.send(req.property_id, &event);

        let order = match gateway.create_order(total, &booking.id.to_string()).await {
            Ok(order) => order,
            Err(e) => {
                // No order means the guest can never pay for this booking.
                // Cancel it so it does not sit Pending forever.
                tracing::warn!(booking = %booking.id, error = %e, "payment order failed, cancelling");
                let cancel = Event::BookingCancelled { id: booking.id };
                self.wal_append(&cancel).await?;
                self.ledger.cancel(&booking.id);
                self.notify.send(req.property_id, &cancel);
                return Err(EngineError::PaymentError(e));
            }
        };

        tracing::info!(
            booking = %booking.id,
            property = %req.property_id,
            order = %order.order_id,
            total,
            "booking created"
        );
        Ok(BookingReceipt {
            booking_id: booking.id,
            order_id: order.order_id,
            key: gateway.public_key().to_string(),
        })
    }

    /// Settle a Pending booking after the payment provider confirms.
    ///
    /// Capacity is re-checked under the property lock before flipping to
    /// Confirmed, because other bookings may have been confirmed since this
    /// one was created. A booking that no longer fits is cancelled. Already
    /// Confirmed bookings are accepted again without change (webhook
    /// retries).
    pub async fn confirm_payment(
        &self,
        booking_id: Ulid,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .ledger
            .get(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        // Property may be gone; orphaned bookings confirm without a
        // capacity check since there is no inventory left to protect.
        let property = self.get_property(&booking.property_id);
        let guard = match &property {
            Some(arc) => Some(arc.write().await),
            None => None,
        };

        // Status is read under the lock. A cancellation racing this
        // confirmation either lands before (seen here) or waits for the
        // lock, never in between.
        let booking = self
            .ledger
            .get(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        match booking.status {
            BookingStatus::Confirmed => return Ok(booking),
            BookingStatus::Cancelled => {
                return Err(EngineError::InvalidTransition("booking was cancelled"))
            }
            BookingStatus::Pending => {}
        }

        if let Some(guard) = &guard {
            let booked = self.ledger.confirmed_rooms(
                &booking.property_id,
                &booking.stay,
                Some(booking_id),
            );
            let free = availability::free_rooms(guard.max_rooms, booked);
            if booking.capacity.rooms > free {
                let cancel = Event::BookingCancelled { id: booking_id };
                self.wal_append(&cancel).await?;
                self.ledger.cancel(&booking_id);
                self.notify.send(booking.property_id, &cancel);
                metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
                tracing::warn!(booking = %booking_id, "capacity lost before payment, cancelled");
                return Err(EngineError::CapacityExceeded { available: free });
            }
        }

        let event = Event::BookingConfirmed {
            id: booking_id,
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
        };
        self.wal_append(&event).await?;
        self.ledger.confirm(&booking_id, order_id, payment_id);
        drop(guard);
        metrics::counter!(crate::observability::BOOKINGS_CONFIRMED_TOTAL).increment(1);
        self.notify.send(booking.property_id, &event);
        tracing::info!(booking = %booking_id, order = %order_id, "booking confirmed");

        self.ledger
            .get(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// Cancel a booking. Cancelling twice is a no-op.
    pub async fn cancel_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let booking = self
            .ledger
            .get(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        // Same lock as `confirm_payment`, so the two serialize and a
        // Cancelled booking can never flip back to Confirmed.
        let property = self.get_property(&booking.property_id);
        let _guard = match &property {
            Some(arc) => Some(arc.write().await),
            None => None,
        };

        let booking = self
            .ledger
            .get(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }

        let event = Event::BookingCancelled { id: booking_id };
        self.wal_append(&event).await?;
        self.ledger.cancel(&booking_id);
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        self.notify.send(booking.property_id, &event);
        tracing::info!(booking = %booking_id, "booking cancelled");

        self.ledger
            .get(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))
    }
}
