//! Generic store integration tests.

mod support;
mod concurrency;
mod crud;
mod hooks;
mod list;
mod watch;
