pub mod collection;
pub mod error;
pub mod record;
pub mod registry;

pub use collection::{RecordStore, WriteOutcome};
pub use error::StoreError;
pub use record::{Fields, Record, RecordId};
pub use registry::DataDir;
