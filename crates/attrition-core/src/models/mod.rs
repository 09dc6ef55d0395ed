pub mod classifier_trait;
pub mod factory;
pub mod pipeline;
pub mod tree;
