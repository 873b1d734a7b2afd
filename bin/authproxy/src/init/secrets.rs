//! Load the token signing secrets from the authentication configuration.
use anyhow::Context as _;
use anyhow::Result;
use time::Duration;
use time::OffsetDateTime;

use authproxy_auth::identity::TokenSecrets;
use authproxy_conf::AuthConf;

/// The configured secret is empty and can't be used to sign tokens.
#[derive(Debug, thiserror::Error)]
#[error("the token signing secret must not be empty")]
pub struct EmptySecret;

/// Unable to read the secret file.
#[derive(Debug, thiserror::Error)]
#[error("unable to read token signing secret from '{0}'")]
pub struct SecretFileError(String);

/// Determine the secrets to sign and verify tokens with.
///
/// Without a configured secret a random one is generated, which means tokens
/// are invalidated on restart and can't be shared across proxy instances.
pub fn load(logger: &slog::Logger, conf: &AuthConf) -> Result<TokenSecrets> {
    let current = match (&conf.secret, &conf.secret_file) {
        (Some(secret), _) => Some(secret.as_bytes().to_vec()),
        (None, Some(path)) => {
            let secret = std::fs::read_to_string(path)
                .with_context(|| SecretFileError(path.clone()))?;
            Some(secret.trim_end().as_bytes().to_vec())
        }
        (None, None) => None,
    };
    let secrets = match current {
        Some(secret) if secret.is_empty() => anyhow::bail!(EmptySecret),
        Some(secret) => TokenSecrets::new(secret),
        None => {
            slog::warn!(
                logger,
                "No token signing secret configured, using a random one";
                "hint" => "tokens will not survive a restart or work across instances",
            );
            TokenSecrets::generate()
        }
    };

    let previous = match &conf.previous_secret {
        Some(previous) if !previous.is_empty() => previous,
        _ => return Ok(secrets),
    };
    let grace = Duration::seconds(conf.previous_secret_grace_sec as i64);
    let valid_until = OffsetDateTime::now_utc() + grace;
    slog::info!(
        logger, "Accepting tokens signed with the previous secret";
        "valid_until" => %valid_until,
    );
    Ok(secrets.with_previous(previous.as_bytes().to_vec(), valid_until))
}
