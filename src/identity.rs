// 🪪 Identity Resolver - Best-effort "one visitor" across sessions
//
// Layered duplicate-submission check, each layer consulted only when the
// previous one yields no answer:
//   1. Local flag      - persisted "this browser already submitted"
//   2. Fingerprint     - device/browser fingerprint, may be unavailable
//   3. Remote lookup   - identity store queried by fingerprint
//
// Identities are created lazily (first tier move), never at page load.
// Multi-device duplicates are mitigated, not prevented.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::db::TierStore;
use crate::error::{Result, TierListError};

// ============================================================================
// IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn generate() -> Self {
        IdentityId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-PII device characteristics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u8,
    pub pixel_ratio: f32,
    pub platform: String,
    pub language: String,
    pub timezone: String,
}

impl DeviceInfo {
    fn has_signal(&self) -> bool {
        self.screen_width > 0 || !self.platform.is_empty() || !self.timezone.is_empty()
    }
}

/// What gets sent to the store when a new identity is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityDraft {
    pub fingerprint: Option<String>,
    pub user_agent: String,
    pub device_info: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub fingerprint: Option<String>,
    pub user_agent: String,
    pub device_info: DeviceInfo,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SESSION CONTEXT (local persisted state)
// ============================================================================

/// Visitor state that survives across visits on one device.
///
/// Absent until the first successful move; never torn down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(rename = "tierlist_submitted", default)]
    pub submitted: bool,

    #[serde(rename = "tierlist_user_id", default)]
    pub identity_id: Option<IdentityId>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl SessionContext {
    /// Fresh, unpersisted session
    pub fn ephemeral() -> Self {
        SessionContext::default()
    }

    /// Load from disk. A missing file is a fresh session, a corrupt one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut session = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read session file {}", path.display()))
                .map_err(TierListError::Session)?;
            serde_json::from_str::<SessionContext>(&raw)
                .with_context(|| format!("Corrupt session file {}", path.display()))
                .map_err(TierListError::Session)?
        } else {
            SessionContext::default()
        };

        session.path = Some(path.to_path_buf());
        Ok(session)
    }

    /// Persist; a no-op for ephemeral sessions
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize session")
            .map_err(TierListError::Session)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write session file {}", path.display()))
            .map_err(TierListError::Session)?;

        Ok(())
    }

    pub fn mark_submitted(&mut self) {
        self.submitted = true;
        self.persist();
    }

    pub fn remember_identity(&mut self, id: IdentityId) {
        self.identity_id = Some(id);
        self.persist();
    }

    /// Local storage failures never break the session
    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "could not persist session, continuing in memory");
        }
    }
}

// ============================================================================
// FINGERPRINTING
// ============================================================================

/// Best-effort device fingerprint. `None` means "cannot determine",
/// never "no identity".
pub trait Fingerprinter {
    fn fingerprint(&self) -> Option<String>;
}

/// SHA-256 over the device characteristics and user agent
#[derive(Debug, Clone)]
pub struct DeviceFingerprinter {
    pub user_agent: String,
    pub device_info: DeviceInfo,
}

impl DeviceFingerprinter {
    pub fn new(user_agent: &str, device_info: DeviceInfo) -> Self {
        DeviceFingerprinter {
            user_agent: user_agent.to_string(),
            device_info,
        }
    }

    /// Fingerprint of the machine this binary runs on
    pub fn for_local_machine() -> Self {
        let device_info = DeviceInfo {
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            language: std::env::var("LANG").unwrap_or_default(),
            timezone: std::env::var("TZ").unwrap_or_default(),
            ..DeviceInfo::default()
        };
        let user_agent = format!(
            "commander-tierlist/{} ({})",
            env!("CARGO_PKG_VERSION"),
            std::env::var("USER").unwrap_or_default()
        );
        DeviceFingerprinter::new(&user_agent, device_info)
    }
}

impl Fingerprinter for DeviceFingerprinter {
    fn fingerprint(&self) -> Option<String> {
        if self.user_agent.trim().is_empty() && !self.device_info.has_signal() {
            return None;
        }

        let device_json = serde_json::to_string(&self.device_info).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}", self.user_agent, device_json));
        Some(format!("{:x}", hasher.finalize()))
    }
}

/// Fingerprint computed elsewhere (e.g. sent by a browser to the server)
#[derive(Debug, Clone, Default)]
pub struct KnownFingerprint(pub Option<String>);

impl Fingerprinter for KnownFingerprint {
    fn fingerprint(&self) -> Option<String> {
        self.0.clone().filter(|fp| !fp.trim().is_empty())
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Identity id was already cached in the session
    Stored(IdentityId),

    /// Found remotely by fingerprint, now cached
    Matched(IdentityId),

    /// Fingerprint available, no matching identity
    Unknown,

    /// No fingerprint: identity cannot be determined
    Undetermined,
}

impl Resolution {
    pub fn identity_id(&self) -> Option<&IdentityId> {
        match self {
            Resolution::Stored(id) | Resolution::Matched(id) => Some(id),
            Resolution::Unknown | Resolution::Undetermined => None,
        }
    }
}

pub struct IdentityResolver<F: Fingerprinter> {
    fingerprinter: F,
    user_agent: String,
    device_info: DeviceInfo,
}

impl<F: Fingerprinter> IdentityResolver<F> {
    pub fn new(fingerprinter: F, user_agent: &str, device_info: DeviceInfo) -> Self {
        IdentityResolver {
            fingerprinter,
            user_agent: user_agent.to_string(),
            device_info,
        }
    }

    /// Three-layer "has this visitor submitted before?" check
    pub fn has_prior_submission<S: TierStore>(
        &self,
        session: &SessionContext,
        store: &S,
    ) -> Result<bool> {
        // Layer 1: cheapest, may be a false positive across cleared storage
        if session.submitted {
            return Ok(true);
        }

        // Layer 2
        let Some(fingerprint) = self.fingerprinter.fingerprint() else {
            debug!("no fingerprint available, assuming no prior submission");
            return Ok(false);
        };

        // Layer 3
        let found = store
            .find_identity_by_fingerprint(&fingerprint)
            .map_err(|e| TierListError::IdentityResolution(e.to_string()))?;
        Ok(found.is_some())
    }

    /// Find the visitor's existing identity, caching a remote match locally
    pub fn resolve<S: TierStore>(
        &self,
        session: &mut SessionContext,
        store: &S,
    ) -> Result<Resolution> {
        if let Some(id) = &session.identity_id {
            return Ok(Resolution::Stored(id.clone()));
        }

        let Some(fingerprint) = self.fingerprinter.fingerprint() else {
            warn!("fingerprinting failed, identity undetermined");
            return Ok(Resolution::Undetermined);
        };

        let found = store
            .find_identity_by_fingerprint(&fingerprint)
            .map_err(|e| TierListError::IdentityResolution(e.to_string()))?;

        match found {
            Some(id) => {
                info!(identity = %id, "matched returning visitor by fingerprint");
                session.remember_identity(id.clone());
                Ok(Resolution::Matched(id))
            }
            None => Ok(Resolution::Unknown),
        }
    }

    /// Create a new identity record and cache its id in the session
    pub fn create_identity<S: TierStore>(
        &self,
        session: &mut SessionContext,
        store: &S,
    ) -> Result<IdentityId> {
        let draft = IdentityDraft {
            fingerprint: self.fingerprinter.fingerprint(),
            user_agent: self.user_agent.clone(),
            device_info: self.device_info.clone(),
        };

        let id = store
            .create_identity(&draft)
            .map_err(TierListError::IdentityCreation)?;

        info!(identity = %id, has_fingerprint = draft.fingerprint.is_some(), "created identity");
        session.remember_identity(id.clone());
        Ok(id)
    }

    /// Resolve, else create. Lookup failures degrade to creating a new identity.
    pub fn ensure_identity<S: TierStore>(
        &self,
        session: &mut SessionContext,
        store: &S,
    ) -> Result<IdentityId> {
        match self.resolve(session, store) {
            Ok(resolution) => {
                if let Some(id) = resolution.identity_id() {
                    return Ok(id.clone());
                }
            }
            Err(e) => warn!(error = %e, "identity lookup failed, creating a new identity"),
        }

        self.create_identity(session, store)
    }
}

// ============================================================================
// TESTS
// ============================================================================
