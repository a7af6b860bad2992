//! Side-effecting operations: filesystem, configuration and agent processes.

pub mod agent;
pub mod config;
pub mod init;
pub mod prompt;
pub mod task_file;
