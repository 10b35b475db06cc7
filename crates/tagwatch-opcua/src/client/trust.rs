// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Peer certificate validation and trust decisions.
//!
//! ```text
//! PeerCertificate ──► StoreValidator ──ok──► accepted (policy not consulted)
//!                          │
//!                        failure
//!                          ▼
//!                     TrustPolicy::decide ──Accept──► TrustStore::trust ──► accepted
//!                          │
//!                        Reject ──► TrustStore::reject ──► CertificateRejected
//! ```
//!
//! The [`CertificateGate`] ties the three together and is what the resolver and
//! the transport call. The store uses the `<CN> [<thumbprint>].der` naming of the
//! underlying OPC UA stack so a certificate trusted here also passes the
//! library's own check during the handshake.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OpcUaResult, SecurityError};
use crate::types::StatusCode;

/// Audit log target for trust decisions.
pub const AUDIT_TARGET: &str = "tagwatch::audit";

// =============================================================================
// ValidationFailure
// =============================================================================

/// Reason a peer certificate failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationFailure {
    /// Not present in the trusted store.
    Untrusted,
    /// Past its `not_after` date.
    Expired,
    /// Before its `not_before` date.
    NotYetValid,
    /// Host name does not match the dialed host.
    HostNameMismatch,
    /// Application URI does not match the server description.
    UriMismatch,
    /// Revoked by its issuer.
    Revoked,
    /// Revocation status could not be determined.
    RevocationUnknown,
    /// Could not be decoded.
    Malformed,
    /// Key usage does not allow this purpose.
    UseNotAllowed,
    /// Issuer chain could not be built.
    ChainIncomplete,
    /// Any other failure reported by the stack.
    Other(StatusCode),
}

impl ValidationFailure {
    /// Returns `true` for [`ValidationFailure::Untrusted`].
    #[inline]
    pub const fn is_untrusted(&self) -> bool {
        matches!(self, Self::Untrusted)
    }

    /// Maps an OPC UA status code to a failure.
    pub fn from_status(status: StatusCode) -> Self {
        match status.sub_code() {
            0x801A_0000 => Self::Untrusted,
            0x8014_0000 | 0x8015_0000 => Self::Expired,
            0x8016_0000 => Self::HostNameMismatch,
            0x8017_0000 => Self::UriMismatch,
            0x801D_0000 => Self::Revoked,
            0x801B_0000 => Self::RevocationUnknown,
            0x8012_0000 => Self::Malformed,
            0x8018_0000 => Self::UseNotAllowed,
            0x810D_0000 => Self::ChainIncomplete,
            _ => Self::Other(status),
        }
    }

    /// Returns the OPC UA status code for this failure.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Untrusted => StatusCode::BAD_CERTIFICATE_UNTRUSTED,
            Self::Expired | Self::NotYetValid => StatusCode::BAD_CERTIFICATE_TIME_INVALID,
            Self::HostNameMismatch => StatusCode::BAD_CERTIFICATE_HOST_NAME_INVALID,
            Self::UriMismatch => StatusCode::BAD_CERTIFICATE_URI_INVALID,
            Self::Revoked => StatusCode::BAD_CERTIFICATE_REVOKED,
            Self::RevocationUnknown => StatusCode::BAD_CERTIFICATE_REVOCATION_UNKNOWN,
            Self::Malformed => StatusCode::BAD_CERTIFICATE_INVALID,
            Self::UseNotAllowed => StatusCode::BAD_CERTIFICATE_USE_NOT_ALLOWED,
            Self::ChainIncomplete => StatusCode::BAD_CERTIFICATE_CHAIN_INCOMPLETE,
            Self::Other(status) => *status,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untrusted => write!(f, "certificate is not trusted"),
            Self::Expired => write!(f, "certificate has expired"),
            Self::NotYetValid => write!(f, "certificate is not yet valid"),
            Self::HostNameMismatch => write!(f, "certificate host name does not match"),
            Self::UriMismatch => write!(f, "certificate application URI does not match"),
            Self::Revoked => write!(f, "certificate has been revoked"),
            Self::RevocationUnknown => write!(f, "certificate revocation status unknown"),
            Self::Malformed => write!(f, "certificate is malformed"),
            Self::UseNotAllowed => write!(f, "certificate use not allowed"),
            Self::ChainIncomplete => write!(f, "certificate chain incomplete"),
            Self::Other(status) => write!(f, "certificate validation failed ({})", status),
        }
    }
}

/// Every failure raised against one certificate, in check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateValidationError {
    failures: Vec<ValidationFailure>,
}

impl CertificateValidationError {
    /// Creates an error with a single failure.
    pub fn single(failure: ValidationFailure) -> Self {
        Self {
            failures: vec![failure],
        }
    }

    /// Creates an error from a failure list. Returns `None` for an empty list.
    pub fn from_failures(failures: Vec<ValidationFailure>) -> Option<Self> {
        (!failures.is_empty()).then_some(Self { failures })
    }

    /// Returns the first failure found.
    pub fn primary(&self) -> ValidationFailure {
        self.failures[0]
    }

    /// Returns all failures.
    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    /// Returns `true` when the only failure is [`ValidationFailure::Untrusted`].
    pub fn is_only_untrusted(&self) -> bool {
        matches!(self.failures.as_slice(), [ValidationFailure::Untrusted])
    }
}

impl fmt::Display for CertificateValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

// =============================================================================
// PeerCertificate
// =============================================================================

/// A server certificate presented during discovery or the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCertificate {
    /// DER encoding.
    pub der: Vec<u8>,
    /// Subject common name.
    pub subject: String,
    /// SHA-1 thumbprint, lowercase hex.
    pub thumbprint: String,
    /// Start of the validity window.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the validity window.
    pub not_after: Option<DateTime<Utc>>,
    /// Host names the certificate is issued for.
    pub host_names: Vec<String>,
    /// Application URI from the subject alternative name.
    pub application_uri: Option<String>,
}

impl PeerCertificate {
    /// Returns the file name used in the trusted and rejected stores.
    pub fn file_name(&self) -> String {
        let prefix = self.subject.trim().replace('/', "");
        if prefix.is_empty() {
            format!("{}.der", self.thumbprint)
        } else {
            format!("{} [{}].der", prefix, self.thumbprint)
        }
    }

    /// Returns `true` when `host` is one of the certificate's host names.
    pub fn matches_host(&self, host: &str) -> bool {
        self.host_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(host))
    }
}

// =============================================================================
// TrustPolicy
// =============================================================================

/// Outcome of a trust decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    /// Proceed with the handshake.
    Accept,
    /// Abort the handshake.
    Reject,
}

impl TrustDecision {
    /// Returns `true` for [`TrustDecision::Accept`].
    #[inline]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

impl fmt::Display for TrustDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Decides whether a certificate that failed validation may still be used.
///
/// Only called for certificates with at least one validation failure.
pub trait TrustPolicy: Send + Sync {
    /// Returns the decision for `cert`.
    fn decide(&self, cert: &PeerCertificate, error: &CertificateValidationError) -> TrustDecision;
}

/// Trust on first use: accepts a certificate whose only fault is being
/// unknown, when enabled. Everything else is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustOnFirstUse {
    auto_accept_untrusted: bool,
}

impl TrustOnFirstUse {
    /// Creates the policy.
    pub const fn new(auto_accept_untrusted: bool) -> Self {
        Self {
            auto_accept_untrusted,
        }
    }

    /// Returns `true` when unknown certificates are accepted.
    pub const fn auto_accept_untrusted(&self) -> bool {
        self.auto_accept_untrusted
    }
}

impl TrustPolicy for TrustOnFirstUse {
    fn decide(&self, cert: &PeerCertificate, error: &CertificateValidationError) -> TrustDecision {
        if self.auto_accept_untrusted && error.is_only_untrusted() {
            tracing::warn!(
                target: AUDIT_TARGET,
                subject = %cert.subject,
                thumbprint = %cert.thumbprint,
                "Accepting untrusted server certificate"
            );
            TrustDecision::Accept
        } else {
            tracing::error!(
                target: AUDIT_TARGET,
                subject = %cert.subject,
                thumbprint = %cert.thumbprint,
                reason = %error,
                "Rejecting server certificate"
            );
            TrustDecision::Reject
        }
    }
}

// =============================================================================
// TrustStore
// =============================================================================

/// Directory-backed store of trusted and rejected peer certificates.
///
/// Layout under the PKI directory:
///
/// ```text
/// pki/
/// ├── own/       application certificate
/// ├── private/   application private key
/// ├── trusted/   <CN> [<thumbprint>].der
/// └── rejected/  <CN> [<thumbprint>].der
/// ```
#[derive(Debug, Clone)]
pub struct TrustStore {
    root: PathBuf,
}

impl TrustStore {
    const TRUSTED_DIR: &'static str = "trusted";
    const REJECTED_DIR: &'static str = "rejected";

    /// Creates a store rooted at `pki_dir`. Nothing is touched until first use.
    pub fn new(pki_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: pki_dir.into(),
        }
    }

    /// Returns the PKI root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the trusted certificate directory.
    pub fn trusted_dir(&self) -> PathBuf {
        self.root.join(Self::TRUSTED_DIR)
    }

    /// Returns the rejected certificate directory.
    pub fn rejected_dir(&self) -> PathBuf {
        self.root.join(Self::REJECTED_DIR)
    }

    /// Creates the trusted and rejected directories.
    pub fn ensure_dirs(&self) -> OpcUaResult<()> {
        for dir in [self.trusted_dir(), self.rejected_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|e| SecurityError::store(dir.display().to_string(), e.to_string()))?;
        }
        Ok(())
    }

    /// Returns `true` when the trusted store holds this exact certificate.
    pub fn is_trusted(&self, cert: &PeerCertificate) -> bool {
        let path = self.trusted_dir().join(cert.file_name());
        match fs::read(&path) {
            Ok(bytes) => bytes == cert.der,
            Err(_) => false,
        }
    }

    /// Adds a certificate to the trusted store and drops any rejected copy.
    pub fn trust(&self, cert: &PeerCertificate) -> OpcUaResult<PathBuf> {
        self.ensure_dirs()?;
        let path = self.trusted_dir().join(cert.file_name());
        fs::write(&path, &cert.der)
            .map_err(|e| SecurityError::store(path.display().to_string(), e.to_string()))?;

        let rejected = self.rejected_dir().join(cert.file_name());
        if rejected.exists() {
            fs::remove_file(&rejected).map_err(|e| {
                SecurityError::store(rejected.display().to_string(), e.to_string())
            })?;
        }

        tracing::debug!(path = %path.display(), "Stored trusted certificate");
        Ok(path)
    }

    /// Records a certificate in the rejected store.
    pub fn reject(&self, cert: &PeerCertificate) -> OpcUaResult<PathBuf> {
        self.ensure_dirs()?;
        let path = self.rejected_dir().join(cert.file_name());
        fs::write(&path, &cert.der)
            .map_err(|e| SecurityError::store(path.display().to_string(), e.to_string()))?;
        tracing::debug!(path = %path.display(), "Stored rejected certificate");
        Ok(path)
    }
}

// =============================================================================
// StoreValidator
// =============================================================================

/// Validates peer certificates against time, host and the trusted store.
///
/// Checks run in order: well-formedness, validity window, host name, store
/// membership. A malformed certificate stops the checks there.
#[derive(Clone)]
pub struct StoreValidator {
    store: TrustStore,
    expected_host: Option<String>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl fmt::Debug for StoreValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreValidator")
            .field("store", &self.store)
            .field("expected_host", &self.expected_host)
            .finish()
    }
}

impl StoreValidator {
    /// Creates a validator over `store`, using the system clock.
    pub fn new(store: TrustStore) -> Self {
        Self {
            store,
            expected_host: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Sets the host name certificates must be issued for.
    pub fn with_expected_host(mut self, host: impl Into<String>) -> Self {
        self.expected_host = Some(host.into());
        self
    }

    /// Replaces the clock.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    /// Validates `cert`.
    pub fn validate(&self, cert: &PeerCertificate) -> Result<(), CertificateValidationError> {
        if cert.der.is_empty() || cert.thumbprint.is_empty() {
            return Err(CertificateValidationError::single(
                ValidationFailure::Malformed,
            ));
        }

        let mut failures = Vec::new();
        let now = (self.clock)();

        if cert.not_after.is_some_and(|t| now > t) {
            failures.push(ValidationFailure::Expired);
        } else if cert.not_before.is_some_and(|t| now < t) {
            failures.push(ValidationFailure::NotYetValid);
        }

        if let Some(host) = &self.expected_host {
            if !cert.host_names.is_empty() && !cert.matches_host(host) {
                failures.push(ValidationFailure::HostNameMismatch);
            }
        }

        if !self.store.is_trusted(cert) {
            failures.push(ValidationFailure::Untrusted);
        }

        match CertificateValidationError::from_failures(failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// =============================================================================
// CertificateGate
// =============================================================================

/// Validation plus trust decision plus store bookkeeping for one peer.
#[derive(Clone)]
pub struct CertificateGate {
    validator: StoreValidator,
    policy: Arc<dyn TrustPolicy>,
}

impl fmt::Debug for CertificateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateGate")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl CertificateGate {
    /// Creates a gate.
    pub fn new(validator: StoreValidator, policy: Arc<dyn TrustPolicy>) -> Self {
        Self { validator, policy }
    }

    /// Returns the trust store.
    pub fn store(&self) -> &TrustStore {
        self.validator.store()
    }

    /// Judges `cert`, persisting the outcome to the store.
    ///
    /// The policy is consulted only when validation fails.
    pub fn judge(&self, cert: &PeerCertificate) -> OpcUaResult<()> {
        let error = match self.validator.validate(cert) {
            Ok(()) => {
                tracing::debug!(subject = %cert.subject, "Server certificate is trusted");
                return Ok(());
            }
            Err(error) => error,
        };

        match self.policy.decide(cert, &error) {
            TrustDecision::Accept => {
                self.store().trust(cert)?;
                Ok(())
            }
            TrustDecision::Reject => {
                if let Err(e) = self.store().reject(cert) {
                    tracing::warn!(error = %e, "Failed to record rejected certificate");
                }
                Err(SecurityError::certificate_rejected(
                    &cert.subject,
                    &cert.thumbprint,
                    error.primary(),
                )
                .into())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpcUaError;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cert(subject: &str) -> PeerCertificate {
        let now = Utc::now();
        PeerCertificate {
            der: vec![0x30, 0x82, 0x01, 0x0a],
            subject: subject.to_string(),
            thumbprint: "3f2a9c".to_string(),
            not_before: Some(now - ChronoDuration::days(1)),
            not_after: Some(now + ChronoDuration::days(365)),
            host_names: vec!["plc01".to_string()],
            application_uri: Some("urn:plc01:server".to_string()),
        }
    }

    struct CountingPolicy {
        calls: AtomicUsize,
    }

    impl TrustPolicy for CountingPolicy {
        fn decide(&self, _: &PeerCertificate, _: &CertificateValidationError) -> TrustDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TrustDecision::Reject
        }
    }

    #[test]
    fn test_tofu_accepts_only_untrusted() {
        let policy = TrustOnFirstUse::new(true);
        let c = cert("Server");

        let untrusted = CertificateValidationError::single(ValidationFailure::Untrusted);
        assert_eq!(policy.decide(&c, &untrusted), TrustDecision::Accept);

        let expired = CertificateValidationError::single(ValidationFailure::Expired);
        assert_eq!(policy.decide(&c, &expired), TrustDecision::Reject);

        let both = CertificateValidationError::from_failures(vec![
            ValidationFailure::Expired,
            ValidationFailure::Untrusted,
        ])
        .unwrap();
        assert_eq!(policy.decide(&c, &both), TrustDecision::Reject);
    }

    #[test]
    fn test_tofu_disabled_rejects_untrusted() {
        let policy = TrustOnFirstUse::default();
        let untrusted = CertificateValidationError::single(ValidationFailure::Untrusted);
        assert_eq!(policy.decide(&cert("S"), &untrusted), TrustDecision::Reject);
    }

    #[test]
    fn test_failure_status_mapping() {
        assert_eq!(
            ValidationFailure::from_status(StatusCode::BAD_CERTIFICATE_UNTRUSTED),
            ValidationFailure::Untrusted
        );
        assert_eq!(
            ValidationFailure::Revoked.status_code(),
            StatusCode::BAD_CERTIFICATE_REVOKED
        );
        assert_eq!(
            ValidationFailure::from_status(StatusCode::BAD_TIMEOUT),
            ValidationFailure::Other(StatusCode::BAD_TIMEOUT)
        );
    }

    #[test]
    fn test_file_name_matches_stack_convention() {
        assert_eq!(cert("Server/A").file_name(), "ServerA [3f2a9c].der");
        assert_eq!(cert("").file_name(), "3f2a9c.der");
    }

    #[test]
    fn test_validator_checks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let validator =
            StoreValidator::new(TrustStore::new(dir.path())).with_expected_host("plc02");

        let mut c = cert("Server");
        c.not_after = Some(Utc::now() - ChronoDuration::days(1));
        let error = validator.validate(&c).unwrap_err();
        assert_eq!(
            error.failures(),
            &[
                ValidationFailure::Expired,
                ValidationFailure::HostNameMismatch,
                ValidationFailure::Untrusted
            ]
        );
        assert_eq!(error.primary(), ValidationFailure::Expired);

        c.der.clear();
        assert_eq!(
            validator.validate(&c).unwrap_err().failures(),
            &[ValidationFailure::Malformed]
        );
    }

    #[test]
    fn test_validator_uses_clock() {
        let dir = tempfile::tempdir().unwrap();
        let c = cert("Server");
        let before = c.not_before.unwrap() - ChronoDuration::hours(1);
        let validator = StoreValidator::new(TrustStore::new(dir.path())).with_clock(move || before);
        assert_eq!(
            validator.validate(&c).unwrap_err().primary(),
            ValidationFailure::NotYetValid
        );
    }

    #[test]
    fn test_gate_accepts_and_persists_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path());
        let gate = CertificateGate::new(
            StoreValidator::new(store.clone()),
            Arc::new(TrustOnFirstUse::new(true)),
        );

        let c = cert("Server");
        gate.judge(&c).unwrap();
        assert!(store.is_trusted(&c));
        assert!(store.trusted_dir().join("Server [3f2a9c].der").exists());
    }

    #[test]
    fn test_gate_rejects_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path());
        let gate = CertificateGate::new(
            StoreValidator::new(store.clone()),
            Arc::new(TrustOnFirstUse::new(false)),
        );

        let c = cert("Server");
        let error = gate.judge(&c).unwrap_err();
        assert!(matches!(
            error,
            OpcUaError::Security(SecurityError::CertificateRejected {
                failure: ValidationFailure::Untrusted,
                ..
            })
        ));
        assert!(store.rejected_dir().join(c.file_name()).exists());
        assert!(!store.is_trusted(&c));
    }

    #[test]
    fn test_trust_clears_rejected_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path());
        let c = cert("Server");
        store.reject(&c).unwrap();
        store.trust(&c).unwrap();
        assert!(!store.rejected_dir().join(c.file_name()).exists());
    }

    #[test]
    fn test_policy_not_consulted_for_trusted_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path());
        let c = cert("Server");
        store.trust(&c).unwrap();

        let policy = Arc::new(CountingPolicy {
            calls: AtomicUsize::new(0),
        });
        let gate = CertificateGate::new(StoreValidator::new(store), policy.clone());
        gate.judge(&c).unwrap();
        assert_eq!(policy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trusted_file_with_different_bytes_is_untrusted() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path());
        let mut c = cert("Server");
        store.trust(&c).unwrap();
        c.der.push(0xff);
        assert!(!store.is_trusted(&c));
    }
}
