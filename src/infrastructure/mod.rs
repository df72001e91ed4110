pub mod activity_watch_client;
pub mod config;
pub mod error;
pub mod goal_repository;
pub mod storage;
