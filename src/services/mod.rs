pub mod query_engine;

pub use query_engine::{query, QueryResult, RegisterQueryEngine, RegisterReading};
