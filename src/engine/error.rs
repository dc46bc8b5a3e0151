use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    PropertyNotFound(Ulid),
    BookingNotFound(Ulid),
    /// Not enough rooms free on the requested dates.
    CapacityExceeded { available: u32 },
    /// Party size exceeds the per-room guest cap for the requested rooms.
    GuestLimitExceeded { max_guests: u64, rooms: u32 },
    InvalidStay(&'static str),
    InvalidField(&'static str),
    InvalidTransition(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
    PaymentError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::PropertyNotFound(id) => write!(f, "property not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::CapacityExceeded { available } => write!(
                f,
                "not enough rooms available: only {available} rooms are free for the selected dates"
            ),
            EngineError::GuestLimitExceeded { max_guests, rooms } => write!(
                f,
                "too many guests: maximum allowed is {max_guests} guests for {rooms} rooms"
            ),
            EngineError::InvalidStay(msg) => write!(f, "invalid stay: {msg}"),
            EngineError::InvalidField(msg) => write!(f, "invalid field: {msg}"),
            EngineError::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::PaymentError(e) => write!(f, "payment error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
