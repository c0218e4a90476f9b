use reserva_domain::StoreError;

/// Failures of the hold/confirm flow. Everything except a transient
/// store error is terminal: retrying cannot change the outcome.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("requested slot is in the past")]
    Past,

    #[error("resource {0} is unavailable")]
    ResourceUnavailable(String),

    #[error("slot already booked under code {code}")]
    Conflict { code: String },

    #[error("no active hold for this customer")]
    SessionExpired,

    #[error("confirmation code space exhausted after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<BookingError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Classifier for the retry controller: terminal errors must never
    /// be retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingError::Store(e) if e.is_transient())
    }

    /// Terminal outcomes that mean the held slot itself went stale, as
    /// opposed to infrastructure trouble. These clear the hold.
    pub fn invalidates_hold(&self) -> bool {
        matches!(
            self,
            BookingError::Conflict { .. }
                | BookingError::Past
                | BookingError::ResourceUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_store_errors_are_retryable() {
        assert!(!BookingError::Store(StoreError::Timeout).is_terminal());
        assert!(!BookingError::Store(StoreError::Deadlock).is_terminal());
        assert!(!BookingError::Store(StoreError::Connection("reset".into())).is_terminal());
    }

    #[test]
    fn business_rejections_are_terminal() {
        assert!(BookingError::Past.is_terminal());
        assert!(BookingError::Conflict { code: "RSV-000001".into() }.is_terminal());
        assert!(BookingError::SessionExpired.is_terminal());
        assert!(BookingError::CodeSpaceExhausted { attempts: 10 }.is_terminal());
        assert!(BookingError::Store(StoreError::UniqueViolation("code".into())).is_terminal());
    }

    #[test]
    fn only_stale_slot_outcomes_invalidate_the_hold() {
        assert!(BookingError::Conflict { code: "RSV-000001".into() }.invalidates_hold());
        assert!(BookingError::Past.invalidates_hold());
        assert!(!BookingError::SessionExpired.invalidates_hold());
        assert!(!BookingError::Store(StoreError::Timeout).invalidates_hold());
        assert!(!BookingError::RetriesExhausted {
            attempts: 3,
            source: Box::new(BookingError::Store(StoreError::Timeout)),
        }
        .invalidates_hold());
    }
}
