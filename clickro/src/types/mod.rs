//! Type integration with external types
//!
//! Implementation [`FromValue`][f] and `Into<Value>` for external types.
//!
//! Available for:
//!
//! - [`serde`]'s [`Deserialize`][sd] and [`Serialize`][ss] via [`Json`]
//! - [`time`][::time]'s [`PrimitiveDateTime`][tp], [`UtcDateTime`][tu], [`OffsetDateTime`][to]
//!   and [`Date`][td], requires `time` feature
//!
//! [f]: crate::FromValue
//! [sd]: serde::Deserialize
//! [ss]: serde::Serialize
//! [tp]: ::time::PrimitiveDateTime
//! [tu]: ::time::UtcDateTime
//! [to]: ::time::OffsetDateTime
//! [td]: ::time::Date

mod json;
pub use json::Json;

#[cfg(feature = "time")]
mod time;
