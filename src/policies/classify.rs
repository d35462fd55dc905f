//! # Failure classification for handled messages.
//!
//! Maps what a handler did to an [`Outcome`], and the outcome to the
//! [`Settlement`] sent back to the broker:
//!
//! ```text
//! Ok(())                       ─► Success            ─► Ack
//! Err(HandlerError::Transient) ─► TransientFailure   ─► Nack (redeliver later)
//! Err(HandlerError::Fatal)     ─► FatalFailure       ─► Ack  (drop poison message)
//! panic                        ─► FatalFailure       ─► Ack
//! ```

use std::any::Any;

use crate::error::HandlerError;

/// Detail attached to outcomes produced by a recovered panic.
pub const PANIC_DETAIL: &str = "handler panicked";

/// Classified result of handling one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Handler returned `Ok(())`.
    Success,
    /// Handler signalled a transient condition.
    TransientFailure(String),
    /// Handler signalled a non-retryable error, or panicked.
    FatalFailure(String),
}

/// Acknowledgement sent to the broker for a handled message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// Message is considered delivered.
    Ack,
    /// Message should be redelivered.
    Nack,
}

impl Outcome {
    /// Returns the settlement this outcome requires.
    pub fn settlement(&self) -> Settlement {
        match self {
            Outcome::TransientFailure(_) => Settlement::Nack,
            Outcome::Success | Outcome::FatalFailure(_) => Settlement::Ack,
        }
    }

    /// True for both failure variants.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Success)
    }

    /// Failure detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::TransientFailure(d) | Outcome::FatalFailure(d) => Some(d),
        }
    }
}

/// Classifies a handler result that was run under a fault barrier.
///
/// `Err(payload)` is a recovered panic; it always becomes
/// `FatalFailure(PANIC_DETAIL)`.
pub fn classify(result: Result<Result<(), HandlerError>, Box<dyn Any + Send>>) -> Outcome {
    match result {
        Ok(Ok(())) => Outcome::Success,
        Ok(Err(HandlerError::Transient { reason })) => Outcome::TransientFailure(reason),
        Ok(Err(HandlerError::Fatal { reason })) => Outcome::FatalFailure(reason),
        Err(_panic) => Outcome::FatalFailure(PANIC_DETAIL.to_string()),
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_acks() {
        let outcome = classify(Ok(Ok(())));
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(outcome.settlement(), Settlement::Ack);
        assert!(!outcome.is_failure());
    }

    #[test]
    fn transient_nacks() {
        let outcome = classify(Ok(Err(HandlerError::transient("db busy"))));
        assert_eq!(outcome, Outcome::TransientFailure("db busy".into()));
        assert_eq!(outcome.settlement(), Settlement::Nack);
    }

    #[test]
    fn fatal_acks() {
        let outcome = classify(Ok(Err(HandlerError::fatal("bad payload"))));
        assert_eq!(outcome.settlement(), Settlement::Ack);
        assert_eq!(outcome.detail(), Some("bad payload"));
    }

    #[test]
    fn panic_is_fatal_with_generic_detail() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let outcome = classify(Err(payload));
        assert_eq!(outcome, Outcome::FatalFailure(PANIC_DETAIL.into()));
        assert_eq!(outcome.settlement(), Settlement::Ack);
    }

    #[test]
    fn formatted_panic_message_is_extracted() {
        let code = 7;
        let payload = std::panic::catch_unwind(|| panic!("code {code}")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");
    }
}
