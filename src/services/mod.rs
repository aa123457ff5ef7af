pub mod batch;
pub mod catalog;
pub mod dedup;
pub mod diff;
pub mod pacing;
pub mod pagination;
pub mod pipeline;
pub mod playlist;
pub mod resolver;
pub mod similarity;
