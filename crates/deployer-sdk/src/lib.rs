//! Casper deploy client
//!
//! Building blocks for getting a deploy onto a Casper network and following it to execution:
//! key loading, deploy composition and signing, JSON-RPC submission, and result polling through
//! the event service REST API or the SSE event stream.
pub mod deploy;
pub mod event_service;
pub mod jsonrpc;
pub mod keys;
pub mod sse;

pub use deploy::{
    BuildError, DeployParams, MOTES_PER_CSPR, Payment, Session, SignError, SignedDeploy,
    UnsignedDeploy, compose, hash_hex,
};
pub use event_service::{
    EventServiceClient, EventServiceError, ExecutionStatus, PollConfig, ProcessedDeploy,
};
pub use jsonrpc::{CasperClient, CasperClientError, QueryError, SubmitError};
pub use keys::{KeyError, KeyPair};
