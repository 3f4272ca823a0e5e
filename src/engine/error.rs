use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    Validation(&'static str),
    MalformedTime(String),
    ResourceNotFound(Ulid),
    ExperienceNotFound(Ulid),
    ReservationNotFound(Ulid),
    GroupNotFound(Ulid),
    SessionNotFound(String),
    NoOpeningHours(NaiveDate),
    CapacityExceeded { resource_id: Ulid, date: NaiveDate },
    Expired(Ulid),
    Unauthorized(Ulid),
    Store(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::MalformedTime(s) => write!(f, "malformed time, expected HH:MM: {s:?}"),
            EngineError::ResourceNotFound(id) => write!(f, "resource not found: {id}"),
            EngineError::ExperienceNotFound(id) => write!(f, "experience not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::GroupNotFound(id) => write!(f, "reservation group not found: {id}"),
            EngineError::SessionNotFound(id) => write!(f, "payment session not found: {id}"),
            EngineError::NoOpeningHours(date) => write!(f, "no opening hours for {date}"),
            EngineError::CapacityExceeded { resource_id, date } => {
                write!(f, "capacity exceeded for resource {resource_id} on {date}")
            }
            EngineError::Expired(id) => write!(f, "reservation expired: {id}"),
            EngineError::Unauthorized(id) => {
                write!(f, "reservation {id} has a payment session in progress")
            }
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
