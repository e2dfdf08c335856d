//! Pluggable error-recovery policy.
//!
//! The scanner, the xref resolver, and the object loader consult the
//! injected strategy at every recoverable checkpoint instead of deciding
//! locally. A strategy is also the channel through which warnings reach
//! observability: the shipped implementations log every non-`Fail` verdict.
//!
//! Cryptographic and hard semantic failures (wrong password, a trailer that
//! cannot name a catalog after repair) are never offered for recovery.

use crate::error::{Error, Location};

/// What to do about a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Propagate the error; abort the current operation.
    Fail,
    /// Log and continue as if the construct were acceptable.
    Warn,
    /// Attempt an automatic repair (rebuild the xref, resynchronize, ...).
    Fix,
    /// Drop the offending item and continue with the rest.
    Skip,
}

/// Policy consulted when a component hits a recoverable error.
pub trait RecoveryStrategy: Send + Sync {
    /// Decide what to do about `err` raised at `location`.
    fn on_error(&self, err: &Error, location: &Location) -> Action;
}

/// Strategy that never recovers; every error propagates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictRecovery;

impl RecoveryStrategy for StrictRecovery {
    fn on_error(&self, _err: &Error, _location: &Location) -> Action {
        Action::Fail
    }
}

/// Strategy for real-world files: repairs broken cross-reference data,
/// tolerates benign lexical damage, skips unloadable objects, and fails
/// everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientRecovery;

impl RecoveryStrategy for LenientRecovery {
    fn on_error(&self, err: &Error, location: &Location) -> Action {
        let action = match err.root() {
            // Broken or absent xref data: rebuild by scanning.
            Error::XrefMissing
            | Error::XrefTruncated
            | Error::TrailerMalformed(_)
            | Error::TrailerMissingRoot
            | Error::TrailerSizeMismatch { .. } => Action::Fix,

            // Local syntax damage (stray keywords, unterminated
            // constructs): note it and keep going with what was read.
            Error::Lexical { .. } | Error::Truncated => Action::Warn,

            // One bad object should not sink the document.
            Error::ObjectNotFound(_)
            | Error::ObjectHeaderMismatch { .. }
            | Error::ObjectStreamMalformed(_) => Action::Skip,

            _ => Action::Fail,
        };

        if action != Action::Fail {
            log::warn!("recovering ({:?}) from error at {}: {}", action, location, err);
        }
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_strict_always_fails() {
        let strict = StrictRecovery;
        let loc = Location::at("xref", 0);
        assert_eq!(strict.on_error(&Error::XrefMissing, &loc), Action::Fail);
        assert_eq!(
            strict.on_error(
                &Error::Lexical {
                    offset: 0,
                    reason: "x".into()
                },
                &loc
            ),
            Action::Fail
        );
    }

    #[test]
    fn test_lenient_fixes_xref_damage() {
        let lenient = LenientRecovery;
        let loc = Location::at("xref", 0);
        assert_eq!(lenient.on_error(&Error::XrefMissing, &loc), Action::Fix);
        assert_eq!(lenient.on_error(&Error::TrailerMissingRoot, &loc), Action::Fix);
    }

    #[test]
    fn test_lenient_skips_bad_objects() {
        let lenient = LenientRecovery;
        let loc = Location::object("loader", ObjectRef::new(4, 0));
        assert_eq!(
            lenient.on_error(&Error::ObjectNotFound(ObjectRef::new(4, 0)), &loc),
            Action::Skip
        );
    }

    #[test]
    fn test_lenient_fails_crypto() {
        let lenient = LenientRecovery;
        let loc = Location::at("crypto", 0);
        assert_eq!(lenient.on_error(&Error::InvalidPassword, &loc), Action::Fail);
        assert_eq!(
            lenient.on_error(&Error::AuthenticationRequired, &loc),
            Action::Fail
        );
    }

    #[test]
    fn test_lenient_sees_through_location_wrapper() {
        let lenient = LenientRecovery;
        let loc = Location::at("xref", 7);
        let wrapped = Error::XrefMissing.at(loc.clone());
        assert_eq!(lenient.on_error(&wrapped, &loc), Action::Fix);
    }
}
