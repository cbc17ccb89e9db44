// Copyright (c) 2025 - Cowboy AI, Inc.
//! Typed control-plane errors
//!
//! Backends report failures as an [`ApiError`] carrying an [`ErrorKind`].
//! Retry loops decide what is transient by kind alone; turning response
//! bodies into kinds is the adapter's job.

use std::fmt;
use thiserror::Error;

/// Classification of a control-plane failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The ACL system is not bootstrapped yet, or still in legacy mode
    NotBootstrapped,
    /// A token or policy is not visible yet while ACLs propagate
    AclNotFound,
    /// The addressed object does not exist
    NotFound,
    /// Optimistic-concurrency conflict
    Conflict,
    /// Config entries are read only while intentions migrate
    IntentionsMigrating,
    /// Connection, resolver, or dial failure
    Transport,
    /// Upstream gateway timed out
    GatewayTimeout,
    /// No cluster leader elected yet
    NoLeader,
    /// Permission denied
    Forbidden,
    /// The request itself was rejected
    Invalid,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotBootstrapped => "not bootstrapped",
            ErrorKind::AclNotFound => "acl not found",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::IntentionsMigrating => "intentions migrating",
            ErrorKind::Transport => "transport",
            ErrorKind::GatewayTimeout => "gateway timeout",
            ErrorKind::NoLeader => "no leader",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Invalid => "invalid request",
            ErrorKind::Other => "error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed control-plane call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} ({}): {message}", status.map_or_else(|| "-".to_string(), |s| s.to_string()))]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    pub message: String,
}

/// Result type for control-plane calls
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Transient while the credential store comes up
    pub fn is_bootstrap_pending(&self) -> bool {
        matches!(self.kind, ErrorKind::NotBootstrapped | ErrorKind::AclNotFound)
    }

    /// Transient while a peer cluster's servers and gateways settle
    pub fn is_peering_transient(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transport | ErrorKind::GatewayTimeout | ErrorKind::NoLeader
        )
    }
}
