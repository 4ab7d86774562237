//! Process output handling.
//!
//! Raw pipe bytes are framed by [`codec::OutputCodec`], cleaned by
//! [`sanitizer::sanitize`], and delivered as
//! [`OutputEvent`](crate::models::output::OutputEvent)s by
//! [`reader::pump_output`]. Nothing downstream of this module ever sees
//! unsanitized text.

pub mod codec;
pub mod reader;
pub mod sanitizer;

pub use sanitizer::sanitize;
