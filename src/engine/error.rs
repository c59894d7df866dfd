use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{ReservationId, ReservationStatus, ShopId, StylistId};
use crate::store::StoreError;

use super::window::WindowMiss;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Shop,
    Stylist,
    Menu,
    Reservation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Shop => "shop",
            Entity::Stylist => "stylist",
            Entity::Menu => "menu",
            Entity::Reservation => "reservation",
        })
    }
}

/// Whose schedule or capacity a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Shop(ShopId),
    Stylist(StylistId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Shop(id) => write!(f, "shop {id}"),
            Scope::Stylist(id) => write!(f, "stylist {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleViolation {
    StartsInPast { start_at: NaiveDateTime, now: NaiveDateTime },
    OutsideWindow { scope: Scope, miss: WindowMiss },
}

impl fmt::Display for ScheduleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleViolation::StartsInPast { start_at, now } => {
                write!(f, "start {start_at} is before now ({now})")
            }
            ScheduleViolation::OutsideWindow { scope, miss } => write!(f, "{scope}: {miss}"),
        }
    }
}

/// Closed set of failure kinds the calling layer maps to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidParams,
    OutOfSchedule,
    Unavailable,
    Conflict,
    InvalidState,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::OutOfSchedule => "out_of_schedule",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Ulid },

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("out of schedule: {0}")]
    OutOfSchedule(ScheduleViolation),

    #[error("{scope} unavailable: blocked by {blocking:?}")]
    Unavailable {
        scope: Scope,
        /// Reservations occupying the requested interval.
        blocking: Vec<ReservationId>,
    },

    #[error("booking scope busy after {waited:?}; retry")]
    Conflict { waited: Duration },

    #[error("reservation {id} is {status}")]
    InvalidState { id: ReservationId, status: ReservationStatus },

    #[error("storage error: {0}")]
    Storage(String),
}

impl BookingError {
    pub fn not_found(entity: Entity, id: Ulid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::NotFound { .. } => ErrorKind::NotFound,
            BookingError::InvalidParams(_) => ErrorKind::InvalidParams,
            BookingError::OutOfSchedule(_) => ErrorKind::OutOfSchedule,
            BookingError::Unavailable { .. } => ErrorKind::Unavailable,
            BookingError::Conflict { .. } => ErrorKind::Conflict,
            BookingError::InvalidState { .. } => ErrorKind::InvalidState,
            BookingError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// True when the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Conflict { .. })
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LockTimeout { waited } => BookingError::Conflict { waited },
            StoreError::Invalid(msg) | StoreError::LimitExceeded(msg) => {
                BookingError::InvalidParams(msg.to_string())
            }
            StoreError::NotFound(id) => BookingError::not_found(Entity::Reservation, id),
            other => BookingError::Storage(other.to_string()),
        }
    }
}
