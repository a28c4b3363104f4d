//! Error primitives shared across the workspace.
//!
//! Typed errors that callers match on are defined next to the code that raises them (with `snafu`). Anything that
//! only needs to be reported, such as failures coming back from the registry or the inventory, travels as a
//! [`GenericError`].
#![deny(missing_docs)]

use std::fmt::Display;

/// An opaque, reportable error.
pub type GenericError = anyhow::Error;

/// Builds a [`GenericError`].
///
/// Accepts a string literal, a format string with arguments, or any value implementing `Debug` and `Display`. When
/// given an existing `std::error::Error`, its source chain is preserved.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

/// Extension methods for attaching context to a failed `Result`.
///
/// This mirrors `anyhow::Context` under different method names so it can be imported next to `snafu::ResultExt`
/// without the two colliding.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wraps the error with the given context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wraps the error with context built only when the result is an error.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, f)
    }
}
