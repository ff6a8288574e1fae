//! Shared helpers for in-crate unit tests.
//!
//! Compiled only under `cfg(test)`. Integration tests under `tests/` carry
//! their own copy of the socket guard in `tests/support/`.

pub mod socket_guard;
