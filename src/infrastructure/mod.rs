pub mod history;
pub mod mock;
pub mod observability;
pub mod persistence;

pub use history::{CsvHistoryProvider, InMemoryHistoryProvider};
pub use mock::RecencyFrequencyModel;
pub use persistence::{InMemoryArtifactStore, JsonFileStore, SqliteArtifactStore, open_store};
