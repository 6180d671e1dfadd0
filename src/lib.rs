//! Typed access to Modbus register maps exported by ComAp GenConfig.
//!
//! The export is parsed once into an immutable [`RegisterCatalog`]; a
//! [`RegisterQueryEngine`] then resolves `(group, name)` pairs, reads the
//! words through any [`RegisterTransport`] and decodes them into
//! unit-annotated values.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use catalog::{
    CustomTypeTable, Encoding, RegisterCatalog, RegisterCatalogParser, RegisterDefinition, Scale,
};
pub use config::Config;
pub use modbus::{DecodedValue, RegisterImage, RegisterTransport, ValueDecoder};
pub use output::{ConsoleFormatter, CsvFormatter, JsonFormatter, ResultFormatter};
pub use services::{query, QueryResult, RegisterQueryEngine};
pub use utils::error::{DecodeError, ParseError, QueryError, TransportError, TypeError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
