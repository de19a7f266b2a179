pub mod config;
pub mod execution;
pub mod models;
pub mod modules;
pub mod orchestration;
pub mod submission;
pub mod task_context;
pub mod tasks;
pub mod title;
