//! Client for the core service that owns session records.
//!
//! Every call is a single JSON request/response. Auth outcomes reported in the
//! `status` field become `SessionError` kinds; everything else that goes wrong
//! on the wire is a `TransportError`. Nothing is retried here.

mod client;
mod types;

pub use client::{AuthorityClient, CDI_VERSION, TransportError};
pub use types::{
    HandshakeInfo, RegeneratedSession, SessionInformation, SessionSummary, SessionTokens,
    SigningKeyMaterial, TokenInfo, VerifiedSession,
};
