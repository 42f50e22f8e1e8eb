//! Shared test doubles for backfill integration tests.

pub mod portal;
