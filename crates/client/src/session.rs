//! The signed-in user.
//!
//! Tokens are issued by an external identity provider; this module only
//! carries them and learns the user's role from the backend.

use emporium_core::{Email, UserProfile, UserRole};
use secrecy::SecretString;
use tracing::instrument;

use crate::api::StoreClient;
use crate::config::ClientConfig;

/// An authenticated user and their bearer token.
#[derive(Clone)]
pub struct Session {
    pub profile: UserProfile,
    token: SecretString,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("profile", &self.profile)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Session {
    #[must_use]
    pub const fn new(profile: UserProfile, token: SecretString) -> Self {
        Self { profile, token }
    }

    /// Session described by the configuration, if both a user email and a
    /// token are set.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        let email = config.user_email.clone()?;
        let token = config.api_token.clone()?;
        let mut profile = UserProfile::new(email);
        profile.display_name.clone_from(&config.user_name);
        Some(Self::new(profile, token))
    }

    /// Attach the token to `client` and sync the user to learn their role.
    ///
    /// A failed sync is logged and leaves the user with the regular role.
    #[instrument(skip_all, fields(email = %profile.email))]
    pub async fn sign_in(client: &StoreClient, mut profile: UserProfile, token: SecretString) -> Self {
        client.set_token(Some(token.clone()));
        profile.role = match client.sync_user(profile.email.as_str(), profile.name()).await {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(error = %e, "User sync failed; continuing without admin role");
                UserRole::User
            }
        };
        tracing::info!(role = %profile.role, "Signed in");
        Self::new(profile, token)
    }

    /// Detach the token from `client`.
    pub fn sign_out(self, client: &StoreClient) {
        client.set_token(None);
        tracing::info!(email = %self.profile.email, "Signed out");
    }

    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.profile.email
    }

    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.profile.role.is_admin()
    }
}
