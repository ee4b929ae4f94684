//! The unified error handling system for the application.

use std::fmt::Display;

pub use request::RequestError;
pub use store::StoreError;
pub use types::ProxyError;

/// A unified `Result` type for the entire application.
pub type Result<T> = std::result::Result<T, ProxyError>;

pub mod request;
pub mod store;
pub mod types;

/// Attach a human readable context to any error convertible into [`ProxyError`].
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<ProxyError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(ProxyError::Context {
                context: context().to_string(),
                source: Box::new(error.into()),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
