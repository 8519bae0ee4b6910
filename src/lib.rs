pub mod benchmark;
pub mod databases;
pub mod error;
pub mod model;

pub use benchmark::{harness, loader};
pub use databases::{mongodb, postgres};
pub use error::{BenchError, Result};
pub use model::CaseRecord;
