pub mod decoder;
pub mod image;
pub mod transport;

pub use decoder::{DecodedValue, Measurement, ValueDecoder};
pub use image::{RegisterImage, SnapshotBlock};
pub use transport::{words_from_bytes, RegisterTransport};
