//! API server integration tests.

mod support;
mod http;
mod registry;
