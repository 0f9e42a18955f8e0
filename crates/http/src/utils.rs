//! Utility macros used internally by the crate.

/// Early-return with an error if a condition is not met.
///
/// Similar to `assert!`, but returns an error instead of panicking. Useful
/// for validation checks that should surface as protocol errors.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
