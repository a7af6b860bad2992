//! Task-list driven agent loop.
//!
//! ralph reads a markdown task list (the PRD), hands the first actionable
//! checkbox to an external agent as a prompt, waits out a short review
//! countdown, and repeats until the list is done. An inactivity watchdog
//! stops the loop when the agent goes quiet.
//!
//! - **[`core`]**: Pure logic (parsing, selection, sanitizing, templating).
//!   No I/O.
//! - **[`timers`]**: The review countdown and inactivity watchdog, driven by
//!   tokio tasks.
//! - **[`io`]**: Filesystem, configuration and agent processes.
//!
//! [`looping`] coordinates all three for `ralph run`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod timers;
