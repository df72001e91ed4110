pub mod bootstrap;
pub mod commands;
pub mod filter_editor;
pub mod goal_progress;
pub mod scheduler;
