//! Caller identity attached to conversation requests
//!
//! Provisioning an identity (sign-in, minting ids) happens elsewhere; this
//! module only carries one that already exists.

use crate::config::IdentityConfig;
use crate::error::{OverlapError, Result};
use serde::{Deserialize, Serialize};

/// Domain used to synthesize an email when none is known
pub const FALLBACK_EMAIL_DOMAIN: &str = "overlap.local";

/// Who is sending a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub user_email: Option<String>,
    pub team_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: None,
            team_id: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Build the identity from configuration
    ///
    /// # Errors
    ///
    /// Returns `OverlapError::MissingIdentity` when no user id is configured.
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let user_id = config
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                OverlapError::MissingIdentity(
                    "set identity.user_id in the config file or OVERLAP_USER_ID".to_string(),
                )
            })?;

        Ok(Self {
            user_id: user_id.to_string(),
            user_email: config.user_email.clone().filter(|e| !e.is_empty()),
            team_id: config.team_id.clone().filter(|t| !t.is_empty()),
        })
    }

    /// Email to present, synthesized from the user id when unknown
    pub fn email(&self) -> String {
        self.user_email
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.user_id, FALLBACK_EMAIL_DOMAIN))
    }
}
