pub mod article;
pub mod preference;
pub mod snapshot;
