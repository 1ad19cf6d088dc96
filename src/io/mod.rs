//! Socket-level settings and helpers shared by the sync and async paths.

pub mod tcp;
