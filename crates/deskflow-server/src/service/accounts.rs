//! Sign-in, credential refresh, and the external directory integration.

use std::sync::Arc;

use deskflow_shared::credential::TokenKind;
use deskflow_shared::{Clock, Role};
use deskflow_store::{Audit, DirectoryUser, SyncStats, User};
use serde::Deserialize;
use tracing::{info, warn};

use super::Store;
use crate::auth::{hash_password_blocking, verify_password_blocking, Authenticator, TokenPair};
use crate::error::{AuthFailure, ServiceError};

/// Company role that maps to [`Role::Management`].
const MANAGEMENT_COMPANY_ROLE: &str = "Project Manager";

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: String,
}

/// One user record as pushed by the directory service.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRecord {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company_role: Option<NamedRef>,
    #[serde(default)]
    pub team: Option<NamedRef>,
    #[serde(default)]
    pub workplace: Option<NamedRef>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl DirectoryRecord {
    fn into_user(self) -> DirectoryUser {
        let role = match &self.company_role {
            Some(r) if r.name.trim() == MANAGEMENT_COMPANY_ROLE => Role::Management,
            _ => Role::Standard,
        };
        DirectoryUser {
            username: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            role,
            phone: self.phone.unwrap_or_default(),
            workplace: self.workplace.map(|w| w.name).unwrap_or_default(),
            team: self.team.map(|t| t.name).unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: Store,
    auth: Authenticator,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(store: Store, auth: Authenticator, clock: Arc<dyn Clock>) -> Self {
        Self { store, auth, clock }
    }

    /// Unknown account, unset password and wrong password are reported
    /// as three distinct failures.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<TokenPair, ServiceError> {
        let user = self.account_for(&credentials.email).await?;
        let Some(stored) = user.password_hash.clone().filter(|h| !h.is_empty()) else {
            warn!(user_id = user.id, "Sign-in to an account without a password");
            return Err(ServiceError::PasswordNotSet);
        };

        if !verify_password_blocking(credentials.password, stored).await? {
            warn!(user_id = user.id, "Sign-in with a wrong password");
            return Err(ServiceError::Unauthorized(AuthFailure::WrongPassword));
        }

        info!(user_id = user.id, role = %user.role, "Signed in");
        self.auth.issue_pair(user.id, user.role)
    }

    /// Trade a refresh credential for a new pair, picking up role changes.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.auth.verify(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.user_id;

        let user = self
            .store
            .call("user", move |db, _| db.get_user_by_id(user_id))
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(_) => ServiceError::Unauthorized(AuthFailure::InvalidToken),
                other => other,
            })?;

        info!(user_id, "Credentials refreshed");
        self.auth.issue_pair(user.id, user.role)
    }

    /// Upsert directory records by email.  Records without an email are
    /// skipped.
    pub async fn sync_directory_users(
        &self,
        records: Vec<DirectoryRecord>,
    ) -> Result<SyncStats, ServiceError> {
        let received = records.len();
        let users: Vec<DirectoryUser> = records
            .into_iter()
            .map(DirectoryRecord::into_user)
            .filter(|u| !u.email.is_empty())
            .collect();
        if users.len() < received {
            warn!(skipped = received - users.len(), "Directory records without an email");
        }

        let at = self.clock.now();
        let stats = self
            .store
            .call("user", move |db, _| db.sync_directory_users(&users, at))
            .await?;

        info!(created = stats.created, updated = stats.updated, "Directory sync finished");
        Ok(stats)
    }

    /// Set the password of a directory account and sign it in.  Standard
    /// users are refused access to this application.
    pub async fn sync_directory_password(
        &self,
        credentials: Credentials,
    ) -> Result<TokenPair, ServiceError> {
        if credentials.password.is_empty() {
            return Err(ServiceError::Validation("password is required".into()));
        }

        let user = self.account_for(&credentials.email).await?;
        if user.role == Role::Standard {
            warn!(user_id = user.id, "Directory sign-in refused for standard role");
            return Err(ServiceError::Forbidden(
                "user not allowed to access this application".into(),
            ));
        }

        let hash = hash_password_blocking(credentials.password).await?;
        let audit = Audit {
            actor: user.id,
            at: self.clock.now(),
        };
        let user_id = user.id;
        self.store
            .call("user", move |db, _| db.update_password(user_id, &hash, audit))
            .await?;

        info!(user_id, "Directory password set");
        self.auth.issue_pair(user.id, user.role)
    }

    async fn account_for(&self, email: &str) -> Result<User, ServiceError> {
        let email = email.trim().to_string();
        self.store
            .call("user", move |db, _| db.find_user_by_email(&email))
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(_) => ServiceError::Unauthorized(AuthFailure::UnknownAccount),
                other => other,
            })
    }
}
