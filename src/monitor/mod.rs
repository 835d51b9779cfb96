//! Ambient observability surface: `/health`, `/ready`, `/metrics`.
//!
//! No crate in this corpus reaches for a Prometheus client library, so
//! metrics stay hand-rolled counters rendered in the text exposition format
//! rather than pulling in a new dependency for it — the corpus's own
//! preference for the ecosystem crate it already uses (`tracing` for
//! everything else observability-shaped) is honored by not inventing a
//! second observability stack where none exists.

pub mod health;
pub mod metrics;
