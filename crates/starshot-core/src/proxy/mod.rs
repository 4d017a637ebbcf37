//! CORS proxy routing and per-proxy health tracking.

pub(crate) mod endpoint;
pub(crate) mod health;
pub(crate) mod router;

pub use endpoint::{origin_of, ProxyEndpoint, ProxyMode};
pub use health::{
    FileHealthStore, HealthTable, MemoryHealthStore, Outcome, ProxyHealthRecord,
    ProxyHealthStore, DEFAULT_HEALTH_TTL,
};
pub use router::{ProxyCandidate, ProxyRouter};
