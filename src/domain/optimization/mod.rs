// Search spaces, trials and ensemble weights
pub mod ensemble_weights;
pub mod search_space;
pub mod trial;
