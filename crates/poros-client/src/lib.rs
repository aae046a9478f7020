//! Rust SDK for the Poros directory and orchestrator.
//!
//! [`PorosClient`] wraps every HTTP surface the server exposes: the agent
//! registry, identity operations, orchestration, and the interop verbs.
//! Identity material can also be produced fully offline through
//! [`KeyPair`] and [`sign_card_locally`], so an owner never has to send a
//! private key over the wire.

mod client;

pub use client::{
    sign_card_locally, AgentQuery, AgentReply, ClientError, DiscoverFilters, Discovered,
    GeneratedIdentity, LogQuery, PorosClient, ServerHealth, SignedCard, VerifyOutcome,
};
pub use poros_identity::KeyPair;
pub use poros_types::{OrchestrateRequest, OrchestrateResponse, OrchestrationLog, RegisteredAgent};
