//! Formatting of caught panic payloads.
//!
//! Connection tasks and workers catch panics raised by hooks and routers.
//! The payload is reduced to text here before it is logged.

use std::{any::Any, borrow::Cow, fmt};

/// Text carried by a panic payload.
///
/// `panic!` payloads are a `&'static str` or a `String`; anything else is
/// reported as an opaque value.
#[must_use]
pub fn panic_text(payload: &(dyn Any + Send)) -> Cow<'_, str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Cow::Borrowed(s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Cow::Borrowed(s.as_str())
    } else {
        Cow::Owned(format!("{payload:?}"))
    }
}

/// Owned panic payload that displays as [`panic_text`].
///
/// ```
/// use wirepool::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&panic_text(self.0.as_ref()))
    }
}

/// Wrap a payload returned by `catch_unwind`.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }
