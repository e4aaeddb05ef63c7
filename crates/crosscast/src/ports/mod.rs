//! Inbound collaborator contracts: the per-process registry that holds the
//! ground truth for local connections and rooms, and the application hook
//! that answers custom queries.

pub mod custom;
pub mod provider;
