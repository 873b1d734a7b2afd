//! Module to deal with the Authentication (who is accessing) side of Auth.
//!
//! Identity is proven by bearer tokens: JWTs signed with HS256 carrying [`TokenClaims`].
//!
//! ## Verification
//!
//! Tokens are checked in order, stopping at the first failure:
//!
//! 1. Structure: the token must be a well formed JWT.
//! 2. Signature: with the current secret or, during a rotation grace window, the previous one.
//! 3. Expiry: with no leeway.
//! 4. Revocation: the token must not have an active entry in the revocation set.
//! 5. Subject: optionally, the user the token was issued to must still exist.
//!
//! Verified claims are cached by token to skip signature checks on repeated use.
//! The cache is never trusted for expiry or revocation, which are checked every time.
//!
//! ## Revocation
//!
//! Revoked tokens are recorded as [`RevocationEntry`] records under
//! `{key_prefix}revocations/{jti}`, expiring with the token they revoke.
//! Expired entries are ignored on read and can optionally be deleted by
//! [`TokenService::sweep_revocations`].
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use moka::future::Cache;
use time::OffsetDateTime;

use authproxy_conf::AuthConf;
use authproxy_context::Context;
use authproxy_models::RevocationEntry;
use authproxy_models::TokenClaims;
use authproxy_models::UserInfo;
use authproxy_store::errors::NotFound;
use authproxy_store::errors::VersionConflict;
use authproxy_store::ExpectedVersion;
use authproxy_store::Store;

use crate::registry::AuthRegistry;

mod errors;
mod secrets;

#[cfg(test)]
mod tests;

pub use self::errors::AuthError;
pub use self::errors::InvalidTokenId;
pub use self::errors::SigningFailed;
pub use self::secrets::TokenSecrets;

/// Options for the [`TokenService`].
#[derive(Clone, Debug)]
pub struct TokenOptions {
    /// Maximum number of verified tokens to cache.
    pub cache_capacity: u64,

    /// Prefix of the store keys owned by the proxy.
    pub key_prefix: String,

    /// Lifetime of issued tokens.
    pub ttl: Duration,

    /// Reject tokens of users that no longer exist.
    pub verify_subject: bool,
}

impl From<&AuthConf> for TokenOptions {
    fn from(value: &AuthConf) -> Self {
        TokenOptions {
            cache_capacity: value.cache_capacity,
            key_prefix: value.key_prefix.clone(),
            ttl: Duration::from_secs(value.token_ttl_sec),
            verify_subject: value.verify_subject,
        }
    }
}

/// A newly issued token and the claims it carries.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub claims: TokenClaims,
    pub token: String,
}

impl IssuedToken {
    /// Time the token stops being valid.
    pub fn expires_at(&self) -> OffsetDateTime {
        self.claims.expires_at()
    }
}

/// Verified claims held in the signature cache.
#[derive(Clone, Debug)]
struct CachedClaims {
    claims: TokenClaims,

    /// Set for tokens signed with the previous secret, which are only valid until its deadline.
    valid_until: Option<OffsetDateTime>,
}

/// Issue, verify and revoke bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    cache: Cache<String, CachedClaims>,
    registry: AuthRegistry,
    revocations_prefix: String,
    secrets: Arc<RwLock<TokenSecrets>>,
    store: Store,
    ttl: Duration,
    verify_subject: bool,
}

impl TokenService {
    /// Initialise a token service signing tokens with the given secrets.
    pub fn new(
        store: Store,
        registry: AuthRegistry,
        secrets: TokenSecrets,
        options: TokenOptions,
    ) -> TokenService {
        let cache = Cache::builder()
            .max_capacity(options.cache_capacity)
            .time_to_live(options.ttl)
            .support_invalidation_closures()
            .build();
        let revocations_prefix = format!(
            "{}revocations/",
            crate::normalise_prefix(&options.key_prefix)
        );
        TokenService {
            cache,
            registry,
            revocations_prefix,
            secrets: Arc::new(RwLock::new(secrets)),
            store,
            ttl: options.ttl,
            verify_subject: options.verify_subject,
        }
    }

    /// Issue a new token for a user, signed with the current secret.
    pub fn issue_token(&self, context: &Context, user: &UserInfo) -> Result<IssuedToken> {
        let now = OffsetDateTime::now_utc();
        let ttl = time::Duration::try_from(self.ttl).context(SigningFailed)?;
        let claims = TokenClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.username.clone(),
            role: user.role,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };
        let key = {
            let secrets = self.secrets.read().expect("token secrets lock poisoned");
            EncodingKey::from_secret(secrets.current())
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
            .context(SigningFailed)?;
        slog::debug!(
            context.logger, "Issued token";
            "token_id" => &claims.jti,
            "subject" => &claims.sub,
            "expires_at" => claims.exp,
        );
        Ok(IssuedToken { claims, token })
    }

    /// Revoke a token before its natural expiry.
    ///
    /// The revocation entry expires with the token. When the token expiry is not known
    /// the longest possible lifetime of tokens issued now is used instead.
    pub async fn revoke_token(
        &self,
        context: &Context,
        token_id: &str,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<RevocationEntry> {
        if token_id.is_empty()
            || !token_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            anyhow::bail!(InvalidTokenId {
                token_id: token_id.to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = match expires_at {
            Some(expires_at) => expires_at,
            None => now + time::Duration::try_from(self.ttl)?,
        };
        let entry = RevocationEntry {
            token_id: token_id.to_string(),
            revoked_at: now,
            expires_at,
        };
        let key = self.revocation_key(token_id);
        self.store
            .put_json(context, &key, &entry, ExpectedVersion::Any)
            .await?;

        // Entries for the token are no longer needed once the revocation is stored.
        let revoked = token_id.to_string();
        let invalidated = self
            .cache
            .invalidate_entries_if(move |_, cached| cached.claims.jti == revoked);
        if let Err(error) = invalidated {
            slog::warn!(
                context.logger, "Unable to invalidate cached claims for revoked token";
                "token_id" => token_id,
                "error" => %error,
            );
        }

        slog::info!(
            context.logger, "Revoked token";
            "token_id" => token_id,
            "expires_at" => %expires_at,
        );
        Ok(entry)
    }

    /// Replace the signing secret, accepting the current one for the `grace` period.
    pub fn rotate(&self, context: &Context, secret: Vec<u8>, grace: time::Duration) {
        self.secrets
            .write()
            .expect("token secrets lock poisoned")
            .rotate(secret, grace);
        self.cache.invalidate_all();
        slog::info!(context.logger, "Rotated token signing secret"; "grace" => %grace);
    }

    /// Delete revocation entries for tokens that have expired.
    ///
    /// Returns the number of entries deleted.
    /// Entries changed while the sweep runs are left for the next sweep.
    pub async fn sweep_revocations(&self, context: &Context) -> Result<usize> {
        let now = OffsetDateTime::now_utc();
        let records = self.store.list(context, &self.revocations_prefix).await?;
        let mut deleted = 0;
        for record in records {
            let entry: RevocationEntry = match record.decode() {
                Ok(entry) => entry,
                Err(error) => {
                    slog::warn!(
                        context.logger, "Skipping undecodable revocation entry";
                        "key" => &record.key,
                        "error" => %error,
                    );
                    continue;
                }
            };
            if entry.active_at(now) {
                continue;
            }
            let result = self
                .store
                .delete(context, &record.key, record.version.into())
                .await;
            match result {
                Ok(()) => deleted += 1,
                Err(error) if error.is::<NotFound>() || error.is::<VersionConflict>() => (),
                Err(error) => return Err(error),
            }
        }
        if deleted > 0 {
            slog::debug!(context.logger, "Swept expired revocation entries"; "deleted" => deleted);
        }
        Ok(deleted)
    }

    /// Verify a token and return its claims.
    ///
    /// Tokens that can't be accepted fail with an [`AuthError`].
    /// Other errors (such as an unavailable store) mean the check could not be completed.
    pub async fn verify_token(&self, context: &Context, token: &str) -> Result<TokenClaims> {
        let now = OffsetDateTime::now_utc();
        let claims = match self.cache.get(token).await {
            Some(cached) if cached.valid_until.map(|until| now < until).unwrap_or(true) => {
                cached.claims
            }
            _ => {
                let verified = self.verify_signature(token, now)?;
                let claims = verified.claims.clone();
                self.cache.insert(token.to_string(), verified).await;
                claims
            }
        };

        if claims.expired_at(now) {
            anyhow::bail!(AuthError::Expired);
        }

        let key = self.revocation_key(&claims.jti);
        match self.store.get_json::<RevocationEntry>(context, &key).await {
            Ok((entry, _)) if entry.active_at(now) => anyhow::bail!(AuthError::Revoked),
            Ok(_) => (),
            Err(error) if error.is::<NotFound>() => (),
            Err(error) => return Err(error),
        }

        if self.verify_subject && self.registry.lookup(context, &claims.sub).await?.is_none() {
            anyhow::bail!(AuthError::UnknownSubject);
        }
        Ok(claims)
    }

    fn revocation_key(&self, token_id: &str) -> String {
        format!("{}{}", self.revocations_prefix, token_id)
    }

    /// Check the token structure and signature, decoding its claims.
    fn verify_signature(&self, token: &str, now: OffsetDateTime) -> Result<CachedClaims> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::Malformed)?;
        if header.alg != Algorithm::HS256 {
            anyhow::bail!(AuthError::Malformed);
        }

        let (current, previous) = {
            let secrets = self.secrets.read().expect("token secrets lock poisoned");
            let current = DecodingKey::from_secret(secrets.current());
            let previous = secrets
                .previous_at(now)
                .map(|(secret, until)| (DecodingKey::from_secret(secret), until));
            (current, previous)
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        match decode(token, &current, &validation) {
            Ok(claims) => {
                return Ok(CachedClaims {
                    claims,
                    valid_until: None,
                })
            }
            Err(AuthError::SignatureMismatch) => (),
            Err(error) => anyhow::bail!(error),
        }
        match previous {
            None => anyhow::bail!(AuthError::SignatureMismatch),
            Some((key, until)) => {
                let claims = decode(token, &key, &validation)?;
                Ok(CachedClaims {
                    claims,
                    valid_until: Some(until),
                })
            }
        }
    }
}

/// Decode and check the signature of a token with a key.
fn decode(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> std::result::Result<TokenClaims, AuthError> {
    match jsonwebtoken::decode::<TokenClaims>(token, key, validation) {
        Ok(data) => Ok(data.claims),
        Err(error) => match error.kind() {
            ErrorKind::InvalidSignature => Err(AuthError::SignatureMismatch),
            _ => Err(AuthError::Malformed),
        },
    }
}
