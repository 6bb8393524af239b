pub mod feature_extractor;
pub mod training_set;

pub use feature_extractor::{CoOccurrence, FeatureExtractor};
pub use training_set::TrainingSet;
