pub mod csv_provider;
pub mod memory;

pub use csv_provider::{CsvHistoryProvider, SourceOrder};
pub use memory::InMemoryHistoryProvider;
