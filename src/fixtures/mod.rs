pub mod engine;
pub mod fetcher;
pub mod follower;
