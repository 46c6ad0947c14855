use std::sync::Arc;

use deskflow_shared::{Caller, Clock, Role};
use deskflow_store::{NewDocument, NewUser, User, UserChanges};
use serde::Deserialize;
use tracing::{info, warn};

use super::{audit, check_uploads, non_blank, Store};
use crate::auth::{hash_password_blocking, verify_password_blocking};
use crate::error::{AuthFailure, ServiceError};

#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub workplace: String,
    #[serde(default)]
    pub team: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub workplace: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub verify_password: String,
}

#[derive(Clone)]
pub struct UserService {
    store: Store,
    clock: Arc<dyn Clock>,
    max_photo_size: usize,
}

impl UserService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, max_photo_size: usize) -> Self {
        Self {
            store,
            clock,
            max_photo_size,
        }
    }

    pub async fn get_users(&self) -> Result<Vec<User>, ServiceError> {
        self.store.call("user", |db, _| db.get_users()).await
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<User, ServiceError> {
        self.store.call("user", move |db, _| db.get_user_by_id(id)).await
    }

    pub async fn add_user(&self, caller: Caller, input: UserInput) -> Result<User, ServiceError> {
        let role = input.role.as_deref().map(Role::from_label).unwrap_or(Role::Standard);
        let user = self.create_user(input, role, Some(caller.user_id)).await?;

        info!(user_id = user.id, created_by = caller.user_id, "User added");
        Ok(user)
    }

    /// Self-service registration.  The account is always a standard user;
    /// any requested role is ignored.
    pub async fn sign_up(&self, input: UserInput) -> Result<User, ServiceError> {
        if input.role.as_deref().is_some_and(|r| Role::from_label(r) != Role::Standard) {
            warn!(email = %input.email.trim(), "Sign-up asked for an elevated role");
        }
        let user = self.create_user(input, Role::Standard, None).await?;

        info!(user_id = user.id, "User signed up");
        Ok(user)
    }

    async fn create_user(
        &self,
        input: UserInput,
        role: Role,
        created_by: Option<i64>,
    ) -> Result<User, ServiceError> {
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(ServiceError::Validation("username is required".into()));
        }
        let email = valid_email(&input.email)?;
        if input.password.is_empty() {
            return Err(ServiceError::Validation("password is required".into()));
        }

        let new_user = NewUser {
            username,
            email,
            password_hash: Some(hash_password_blocking(input.password).await?),
            role,
            phone: input.phone,
            workplace: input.workplace,
            team: input.team,
        };

        let at = self.clock.now();
        self.store
            .call("user", move |db, _| db.add_user(&new_user, created_by, at))
            .await
    }

    /// Users may edit their own profile; only admins may edit others or
    /// change roles.
    pub async fn update_user(
        &self,
        caller: Caller,
        id: i64,
        patch: UserPatch,
    ) -> Result<User, ServiceError> {
        if caller.user_id != id && !caller.role.is_admin() {
            return Err(ServiceError::Forbidden("cannot edit another user".into()));
        }
        let role = non_blank(patch.role).map(|r| Role::from_label(&r));
        if role.is_some() && !caller.role.is_admin() {
            return Err(ServiceError::Forbidden("only admins can change roles".into()));
        }

        let changes = UserChanges {
            username: non_blank(patch.username),
            email: non_blank(patch.email).map(|e| valid_email(&e)).transpose()?,
            role,
            phone: patch.phone,
            workplace: patch.workplace,
            team: patch.team,
        };
        if changes.username.is_none()
            && changes.email.is_none()
            && changes.role.is_none()
            && changes.phone.is_none()
            && changes.workplace.is_none()
            && changes.team.is_none()
        {
            return Err(ServiceError::Validation("nothing to update".into()));
        }

        let audit = audit(caller, self.clock.as_ref());
        let user = self
            .store
            .call("user", move |db, _| db.update_user(id, &changes, audit))
            .await?;

        info!(user_id = id, updated_by = caller.user_id, "User updated");
        Ok(user)
    }

    /// Replace a profile photo.  Users may change their own; admins anyone's.
    pub async fn update_user_photo(
        &self,
        caller: Caller,
        id: i64,
        photo: Option<NewDocument>,
    ) -> Result<User, ServiceError> {
        if caller.user_id != id && !caller.role.is_admin() {
            return Err(ServiceError::Forbidden("cannot change another user's photo".into()));
        }
        let Some(photo) = photo.filter(|p| !p.content.is_empty()) else {
            return Err(ServiceError::Validation("invalid photo".into()));
        };
        check_uploads(std::slice::from_ref(&photo), self.max_photo_size)?;

        let audit = audit(caller, self.clock.as_ref());
        let user = self
            .store
            .call("user", move |db, files| db.update_user_photo(id, &photo, audit, files))
            .await?;

        info!(user_id = id, updated_by = caller.user_id, "User photo updated");
        Ok(user)
    }

    pub async fn delete_user(&self, caller: Caller, id: i64) -> Result<(), ServiceError> {
        if caller.user_id == id {
            return Err(ServiceError::Validation("cannot delete your own account".into()));
        }

        let deleted = self.store.call("user", move |db, _| db.delete_user(id)).await?;
        if !deleted {
            return Err(ServiceError::NotFound("user".into()));
        }

        info!(user_id = id, deleted_by = caller.user_id, "User deleted");
        Ok(())
    }

    /// Change the caller's own password after checking the current one.
    pub async fn update_user_password(
        &self,
        caller: Caller,
        id: i64,
        change: PasswordChange,
    ) -> Result<(), ServiceError> {
        if caller.user_id != id {
            return Err(ServiceError::Forbidden("cannot change another user's password".into()));
        }
        if change.new_password.is_empty() {
            return Err(ServiceError::Validation("new password is required".into()));
        }
        if change.new_password != change.verify_password {
            return Err(ServiceError::Validation("passwords do not match".into()));
        }

        let user = self.get_user_by_id(id).await?;
        let Some(stored) = user.password_hash.filter(|h| !h.is_empty()) else {
            return Err(ServiceError::PasswordNotSet);
        };
        if !verify_password_blocking(change.current_password, stored).await? {
            warn!(user_id = id, "Password change with wrong current password");
            return Err(ServiceError::Unauthorized(AuthFailure::WrongPassword));
        }

        let hash = hash_password_blocking(change.new_password).await?;
        let audit = audit(caller, self.clock.as_ref());
        self.store
            .call("user", move |db, _| db.update_password(id, &hash, audit))
            .await?;

        info!(user_id = id, "Password updated");
        Ok(())
    }
}

fn valid_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(ServiceError::Validation(format!("invalid email '{email}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::service::testing::fixture;

    fn input(email: &str) -> UserInput {
        UserInput {
            username: "citra".into(),
            email: email.into(),
            password: "hunter22".into(),
            role: Some("management".into()),
            phone: "0812".into(),
            workplace: "Jakarta".into(),
            team: "Ops".into(),
        }
    }

    #[tokio::test]
    async fn test_add_user_hashes_password() {
        let fx = fixture().await;
        let svc = UserService::new(fx.store.clone(), fx.clock.clone(), 1024);

        let user = svc.add_user(fx.admin, input("citra@example.com")).await.unwrap();
        assert_eq!(user.role, Role::Management);
        assert_eq!(user.created_by, Some(fx.admin.user_id));
        let hash = user.password_hash.clone().unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash).unwrap());

        // The hash never reaches JSON.
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());

        assert!(matches!(
            svc.add_user(fx.admin, input("CITRA@example.com")).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            svc.add_user(fx.admin, input("not-an-email")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_permissions() {
        let fx = fixture().await;
        let svc = UserService::new(fx.store.clone(), fx.clock.clone(), 1024);

        let own = svc
            .update_user(
                fx.agent,
                fx.agent.user_id,
                UserPatch { phone: Some("0899".into()), ..UserPatch::default() },
            )
            .await
            .unwrap();
        assert_eq!(own.phone, "0899");

        assert!(matches!(
            svc.update_user(
                fx.agent,
                fx.other_agent.user_id,
                UserPatch { phone: Some("1".into()), ..UserPatch::default() },
            )
            .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.update_user(
                fx.agent,
                fx.agent.user_id,
                UserPatch { role: Some("admin".into()), ..UserPatch::default() },
            )
            .await,
            Err(ServiceError::Forbidden(_))
        ));

        let promoted = svc
            .update_user(
                fx.admin,
                fx.agent.user_id,
                UserPatch { role: Some("management".into()), ..UserPatch::default() },
            )
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Management);
    }

    #[tokio::test]
    async fn test_password_change_flow() {
        let fx = fixture().await;
        let svc = UserService::new(fx.store.clone(), fx.clock.clone(), 1024);
        let change = |current: &str, new: &str, verify: &str| PasswordChange {
            current_password: current.into(),
            new_password: new.into(),
            verify_password: verify.into(),
        };

        // Fixture users have no password yet.
        assert!(matches!(
            svc.update_user_password(fx.agent, fx.agent.user_id, change("", "abc", "abc")).await,
            Err(ServiceError::PasswordNotSet)
        ));

        let created = svc.add_user(fx.admin, input("dewi@example.com")).await.unwrap();
        let me = Caller { user_id: created.id, role: created.role };

        assert!(matches!(
            svc.update_user_password(me, me.user_id, change("hunter22", "new-1", "new-2")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.update_user_password(me, me.user_id, change("wrong", "new-1", "new-1")).await,
            Err(ServiceError::Unauthorized(AuthFailure::WrongPassword))
        ));
        assert!(matches!(
            svc.update_user_password(fx.agent, me.user_id, change("hunter22", "x", "x")).await,
            Err(ServiceError::Forbidden(_))
        ));

        svc.update_user_password(me, me.user_id, change("hunter22", "new-1", "new-1"))
            .await
            .unwrap();
        let reloaded = svc.get_user_by_id(me.user_id).await.unwrap();
        assert!(verify_password("new-1", reloaded.password_hash.as_deref().unwrap()).unwrap());
    }

    #[tokio::test]
    async fn test_sign_up_always_creates_standard_user() {
        let fx = fixture().await;
        let svc = UserService::new(fx.store.clone(), fx.clock.clone(), 1024);

        let mut wants_admin = input("eka@example.com");
        wants_admin.role = Some("admin".into());
        let user = svc.sign_up(wants_admin).await.unwrap();
        assert_eq!(user.role, Role::Standard);
        assert_eq!(user.created_by, None);
        assert!(verify_password("hunter22", user.password_hash.as_deref().unwrap()).unwrap());

        assert!(matches!(
            svc.sign_up(input("eka@example.com")).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_photo_owner_or_admin_only() {
        let fx = fixture().await;
        let svc = UserService::new(fx.store.clone(), fx.clock.clone(), 1024);
        let photo = |name: &str, size: usize| NewDocument {
            file_name: name.into(),
            document_type: "image/png".into(),
            content: bytes::Bytes::from(vec![7u8; size]),
        };

        assert!(matches!(
            svc.update_user_photo(fx.agent, fx.other_agent.user_id, Some(photo("a.png", 4))).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.update_user_photo(fx.agent, fx.agent.user_id, None).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.update_user_photo(fx.agent, fx.agent.user_id, Some(photo("big.png", 2048))).await,
            Err(ServiceError::Validation(_))
        ));

        let mine = svc
            .update_user_photo(fx.agent, fx.agent.user_id, Some(photo("me.png", 4)))
            .await
            .unwrap();
        let first = mine.photo.unwrap();
        assert_eq!(fx.store.files().read(&first).await.unwrap(), vec![7u8; 4]);

        let by_admin = svc
            .update_user_photo(fx.admin, fx.agent.user_id, Some(photo("badge.png", 3)))
            .await
            .unwrap();
        assert_ne!(by_admin.photo.as_deref(), Some(first.as_str()));
        assert!(matches!(
            fx.store.files().read(&first).await,
            Err(ServiceError::NotFound(_))
        ));

        assert!(matches!(
            svc.update_user_photo(fx.admin, 9999, Some(photo("x.png", 1))).await,
            Err(ServiceError::NotFound(ref e)) if e == "user"
        ));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let fx = fixture().await;
        let svc = UserService::new(fx.store.clone(), fx.clock.clone(), 1024);

        assert!(matches!(
            svc.delete_user(fx.admin, fx.admin.user_id).await,
            Err(ServiceError::Validation(_))
        ));
        svc.delete_user(fx.admin, fx.other_agent.user_id).await.unwrap();
        assert!(matches!(
            svc.get_user_by_id(fx.other_agent.user_id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(svc.get_users().await.unwrap().len(), 2);
    }
}
