pub mod custom_types;
pub mod definition;
pub mod parser;
pub mod register_catalog;

pub use custom_types::{CustomType, CustomTypeKind, CustomTypeTable};
pub use definition::{Encoding, RegisterDefinition, Scale};
pub use parser::{RegisterCatalogParser, DEFAULT_REGISTER_BASE};
pub use register_catalog::{RegisterCatalog, RegisterGroup};
