// Pipeline ingestion: feed window and payload flattening

pub mod feed;

pub use feed::{parse_feed, FeedWindow};
