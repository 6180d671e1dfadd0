pub mod error;
pub mod text;

pub use error::{DecodeError, ParseError, QueryError, TransportError, TypeError};
pub use text::sanitize_unit;
