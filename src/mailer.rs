use async_trait::async_trait;

use crate::model::Booking;

/// Outbound guest notifications. Delivery is best-effort; a failed send
/// never rolls back the booking it describes.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(&self, booking: &Booking);
}

/// Mailer that only logs. The default until a real provider is wired in.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation(&self, booking: &Booking) {
        tracing::info!(
            booking = %booking.id,
            guest = %booking.guest.email,
            check_in = %booking.stay.check_in,
            check_out = %booking.stay.check_out,
            total = booking.total_price,
            "confirmation email"
        );
    }
}
