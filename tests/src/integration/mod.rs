//! Cross-process integration flows over a shared in-memory bus.

pub mod cluster_queries;
pub mod membership;
