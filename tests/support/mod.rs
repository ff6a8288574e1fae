//! Shared helpers for the integration test suites.

pub mod socket_guard;
