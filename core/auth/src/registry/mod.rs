//! User accounts, their roles and credentials.
//!
//! Users are stored as JSON [`User`] records under `{key_prefix}users/{username}`.
//! The state store conditional writes are the only concurrency control:
//! creations use [`ExpectedVersion::Absent`] and updates are read-modify-write cycles
//! guarded by the version read, retried a bounded number of times.
use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;

use authproxy_conf::AuthConf;
use authproxy_conf::DefaultUser;
use authproxy_context::Context;
use authproxy_models::Role;
use authproxy_models::UpdateUser;
use authproxy_models::User;
use authproxy_models::UserInfo;
use authproxy_store::errors::NotFound;
use authproxy_store::errors::VersionConflict;
use authproxy_store::ExpectedVersion;
use authproxy_store::Store;

pub mod errors;
mod password;


use self::errors::InvalidPassword;
use self::errors::InvalidUsername;
use self::errors::UpdateConflict;
use self::errors::UserExists;
use self::errors::UserNotFound;

/// Maximum length of usernames.
pub const USERNAME_MAX_LEN: usize = 64;

/// Manage user accounts and validate their credentials.
#[derive(Clone)]
pub struct AuthRegistry {
    /// Hash checked when a user does not exist, so response times don't reveal account existence.
    dummy_hash: Arc<str>,
    prefix: String,
    store: Store,
    update_retries: u32,
}

impl AuthRegistry {
    /// Initialise a registry of users persisted in the given [`Store`].
    pub fn new(store: Store, conf: &AuthConf) -> Result<AuthRegistry> {
        let dummy_hash = self::password::hash(&uuid::Uuid::new_v4().to_string())?;
        Ok(AuthRegistry {
            dummy_hash: Arc::from(dummy_hash),
            prefix: format!("{}users/", crate::normalise_prefix(&conf.key_prefix)),
            store,
            update_retries: conf.update_retries.max(1),
        })
    }

    /// Create the given accounts if they don't exist already.
    ///
    /// Existing accounts are never changed, even if their password or role differs
    /// from the given ones, so calling this method any number of times is safe.
    ///
    /// Returns the number of accounts created.
    pub async fn add_default_users(
        &self,
        context: &Context,
        users: &[DefaultUser],
    ) -> Result<usize> {
        let mut created = 0;
        for user in users {
            let result = self
                .create_user(context, &user.username, &user.password, user.role)
                .await;
            match result {
                Ok(_) => created += 1,
                Err(error) if error.is::<UserExists>() => {
                    slog::debug!(
                        context.logger, "Default user already exists";
                        "username" => &user.username,
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(created)
    }

    /// Validate a set of credentials, returning the matching user on success.
    ///
    /// Unknown users and wrong passwords are indistinguishable to callers,
    /// both in result and in the time taken to compute it.
    pub async fn check_credentials(
        &self,
        context: &Context,
        username: &str,
        password: &str,
    ) -> Result<Option<UserInfo>> {
        let user = if valid_username(username) {
            self.lookup(context, username).await?
        } else {
            None
        };
        let hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash.to_string(),
        };
        let matches = self::password::verify_blocking(password.to_string(), hash).await?;
        match user {
            Some(user) if matches => Ok(Some(UserInfo::from(user))),
            _ => Ok(None),
        }
    }

    /// Create a new user with the given password and role.
    pub async fn create_user(
        &self,
        context: &Context,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<UserInfo> {
        check_username(username)?;
        check_password(password)?;
        let password_hash = self::password::hash_blocking(password.to_string()).await?;
        let user = User {
            username: username.to_string(),
            password_hash,
            role,
            created_at: OffsetDateTime::now_utc(),
        };
        let key = self.key(username);
        let result = self
            .store
            .put_json(context, &key, &user, ExpectedVersion::Absent)
            .await;
        match result {
            Ok(_) => (),
            Err(error) if error.is::<VersionConflict>() => {
                anyhow::bail!(UserExists {
                    username: username.to_string(),
                });
            }
            Err(error) => return Err(error),
        };
        slog::info!(
            context.logger, "Created user";
            "username" => username,
            "user_role" => %role,
        );
        Ok(UserInfo::from(user))
    }

    /// Delete a user.
    pub async fn delete_user(&self, context: &Context, username: &str) -> Result<()> {
        check_username(username)?;
        let key = self.key(username);
        let result = self.store.delete(context, &key, ExpectedVersion::Any).await;
        match result {
            Ok(()) => (),
            Err(error) if error.is::<NotFound>() => {
                anyhow::bail!(UserNotFound {
                    username: username.to_string(),
                });
            }
            Err(error) => return Err(error),
        };
        slog::info!(context.logger, "Deleted user"; "username" => username);
        Ok(())
    }

    /// Fetch the public information about a user.
    pub async fn get_user(&self, context: &Context, username: &str) -> Result<UserInfo> {
        check_username(username)?;
        match self.lookup(context, username).await? {
            Some(user) => Ok(UserInfo::from(user)),
            None => anyhow::bail!(UserNotFound {
                username: username.to_string(),
            }),
        }
    }

    /// List all users, sorted by username.
    pub async fn list_users(&self, context: &Context) -> Result<Vec<UserInfo>> {
        let records = self.store.list(context, &self.prefix).await?;
        let mut users = Vec::with_capacity(records.len());
        for record in records {
            let user: User = record.decode()?;
            users.push(UserInfo::from(user));
        }
        users.sort_by(|left, right| left.username.cmp(&right.username));
        Ok(users)
    }

    /// Look up a user record, if the user exists.
    pub async fn lookup(&self, context: &Context, username: &str) -> Result<Option<User>> {
        let key = self.key(username);
        match self.store.get_json::<User>(context, &key).await {
            Ok((user, _)) => Ok(Some(user)),
            Err(error) if error.is::<NotFound>() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Change the role and/or password of a user.
    ///
    /// Concurrent changes to the user cause the update to be re-applied to the latest
    /// version of the record, up to the configured number of attempts.
    pub async fn update_user(
        &self,
        context: &Context,
        username: &str,
        update: UpdateUser,
    ) -> Result<UserInfo> {
        check_username(username)?;
        let password_hash = match update.password {
            None => None,
            Some(password) => {
                check_password(&password)?;
                Some(self::password::hash_blocking(password).await?)
            }
        };

        let key = self.key(username);
        for attempt in 1..=self.update_retries {
            let (mut user, version) = match self.store.get_json::<User>(context, &key).await {
                Ok(found) => found,
                Err(error) if error.is::<NotFound>() => anyhow::bail!(UserNotFound {
                    username: username.to_string(),
                }),
                Err(error) => return Err(error),
            };
            if let Some(hash) = &password_hash {
                user.password_hash = hash.clone();
            }
            if let Some(role) = update.role {
                user.role = role;
            }

            let result = self.store.put_json(context, &key, &user, version.into()).await;
            match result {
                Ok(_) => {
                    slog::info!(
                        context.logger, "Updated user";
                        "username" => username,
                        "user_role" => %user.role,
                        "password_changed" => password_hash.is_some(),
                    );
                    return Ok(UserInfo::from(user));
                }
                Err(error) if error.is::<VersionConflict>() => {
                    slog::debug!(
                        context.logger, "User update conflicted with a concurrent change";
                        "username" => username,
                        "attempt" => attempt,
                    );
                }
                Err(error) => return Err(error),
            }
        }

        anyhow::bail!(UpdateConflict {
            attempts: self.update_retries,
            username: username.to_string(),
        })
    }

    /// Check if a username and password pair is valid.
    pub async fn validate_credentials(
        &self,
        context: &Context,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        let user = self.check_credentials(context, username, password).await?;
        Ok(user.is_some())
    }

    fn key(&self, username: &str) -> String {
        format!("{}{}", self.prefix, username)
    }
}

/// Check if a username follows the allowed format.
pub fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= USERNAME_MAX_LEN
        && username != "."
        && username != ".."
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn check_username(username: &str) -> Result<()> {
    if !valid_username(username) {
        anyhow::bail!(InvalidUsername {
            username: username.to_string(),
        });
    }
    Ok(())
}

fn check_password(password: &str) -> Result<()> {
    if password.is_empty() {
        anyhow::bail!(InvalidPassword);
    }
    Ok(())
}
