//! This crate only exists to host the end-to-end tests under `tests/`.
