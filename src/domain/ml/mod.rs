// Tree learners and feature layout
pub mod feature_registry;
pub mod forest;
pub mod training_metrics;
pub mod tree;
