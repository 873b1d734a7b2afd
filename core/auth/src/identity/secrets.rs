//! Secrets used to sign and verify tokens.
use std::fmt;

use rand::RngCore;
use time::Duration;
use time::OffsetDateTime;

/// Length, in bytes, of randomly generated secrets.
pub const GENERATED_SECRET_LEN: usize = 32;

/// Secret replaced by a rotation, accepted for verification until a deadline.
#[derive(Clone)]
struct PreviousSecret {
    secret: Vec<u8>,
    valid_until: OffsetDateTime,
}

/// Signing secrets of the process.
///
/// Tokens are always signed with the current secret.
/// After a rotation, tokens signed with the immediately prior secret remain valid
/// until the grace window ends.
#[derive(Clone)]
pub struct TokenSecrets {
    current: Vec<u8>,
    previous: Option<PreviousSecret>,
}

impl TokenSecrets {
    /// Use the given secret to sign and verify tokens.
    pub fn new<S: Into<Vec<u8>>>(current: S) -> TokenSecrets {
        TokenSecrets {
            current: current.into(),
            previous: None,
        }
    }

    /// Generate a random secret.
    pub fn generate() -> TokenSecrets {
        let mut secret = vec![0; GENERATED_SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        TokenSecrets::new(secret)
    }

    /// Also accept tokens signed with a previous secret until `valid_until`.
    pub fn with_previous<S>(mut self, previous: S, valid_until: OffsetDateTime) -> Self
    where
        S: Into<Vec<u8>>,
    {
        self.previous = Some(PreviousSecret {
            secret: previous.into(),
            valid_until,
        });
        self
    }

    /// Replace the current secret, accepting the replaced secret for the `grace` period.
    ///
    /// Any older previous secret stops being accepted immediately.
    pub fn rotate<S: Into<Vec<u8>>>(&mut self, secret: S, grace: Duration) {
        let replaced = std::mem::replace(&mut self.current, secret.into());
        self.previous = Some(PreviousSecret {
            secret: replaced,
            valid_until: OffsetDateTime::now_utc() + grace,
        });
    }

    /// Secret to sign new tokens with.
    pub fn current(&self) -> &[u8] {
        &self.current
    }

    /// The previous secret and its deadline, if it is still accepted at the given time.
    pub fn previous_at(&self, now: OffsetDateTime) -> Option<(&[u8], OffsetDateTime)> {
        self.previous
            .as_ref()
            .filter(|previous| now < previous.valid_until)
            .map(|previous| (previous.secret.as_slice(), previous.valid_until))
    }
}

impl fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSecrets")
            .field("current", &"<redacted>")
            .field(
                "previous_valid_until",
                &self.previous.as_ref().map(|previous| previous.valid_until),
            )
            .finish()
    }
}
