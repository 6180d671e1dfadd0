pub mod formatters;

pub use formatters::{ConsoleFormatter, CsvFormatter, JsonFormatter, OutputFormat, ResultFormatter};
