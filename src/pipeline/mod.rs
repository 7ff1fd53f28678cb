// Approach pipeline: feed ingestion, processing stages, load and storage

pub mod ingestion;
pub mod load;
pub mod processing;
pub mod storage;

pub use load::{LoadTarget, Loader};
