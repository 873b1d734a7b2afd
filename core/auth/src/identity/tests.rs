use std::time::Duration;

use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use time::OffsetDateTime;

use authproxy_conf::AuthConf;
use authproxy_context::Context;
use authproxy_models::RevocationEntry;
use authproxy_models::Role;
use authproxy_models::TokenClaims;
use authproxy_models::UserInfo;
use authproxy_store::errors::Unavailable;
use authproxy_store::ExpectedVersion;
use authproxy_store::Store;
use authproxy_store::StoreFixture;

use super::AuthError;
use super::InvalidTokenId;
use super::TokenOptions;
use super::TokenSecrets;
use super::TokenService;
use crate::registry::AuthRegistry;

const SECRET: &[u8] = b"unit-test-secret";

struct Fixture {
    context: Context,
    registry: AuthRegistry,
    service: TokenService,
    store: StoreFixture,
    user: UserInfo,
}

async fn fixture_with(secrets: TokenSecrets, verify_subject: bool) -> Fixture {
    let context = Context::fixture();
    let store = StoreFixture::default();
    let conf = AuthConf {
        verify_subject,
        ..AuthConf::default()
    };
    let registry = AuthRegistry::new(Store::from(store.clone()), &conf).unwrap();
    let user = registry
        .create_user(&context, "alice", "pa55word", Role::Ops)
        .await
        .unwrap();
    let service = TokenService::new(
        Store::from(store.clone()),
        registry.clone(),
        secrets,
        TokenOptions::from(&conf),
    );
    Fixture {
        context,
        registry,
        service,
        store,
        user,
    }
}

async fn fixture() -> Fixture {
    fixture_with(TokenSecrets::new(SECRET), true).await
}

fn sign(claims: &TokenClaims, secret: &[u8]) -> String {
    let key = EncodingKey::from_secret(secret);
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key).unwrap()
}

fn auth_error(error: anyhow::Error) -> AuthError {
    *error
        .downcast_ref::<AuthError>()
        .unwrap_or_else(|| panic!("expected AuthError, got: {:?}", error))
}

#[tokio::test]
async fn issued_token_verifies() {
    let fixture = fixture().await;
    let issued = fixture
        .service
        .issue_token(&fixture.context, &fixture.user)
        .unwrap();
    assert_eq!(issued.claims.sub, "alice");
    assert_eq!(issued.claims.role, Role::Ops);
    assert_eq!(issued.claims.exp - issued.claims.iat, 36000);

    let claims = fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap();
    assert_eq!(claims, issued.claims);

    // Verify again to go through the signature cache.
    let claims = fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap();
    assert_eq!(claims, issued.claims);
}

#[tokio::test]
async fn tokens_are_unique() {
    let fixture = fixture().await;
    let first = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    let second = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    assert_ne!(first.claims.jti, second.claims.jti);
    assert_ne!(first.token, second.token);
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    let fixture = fixture().await;
    for token in ["", "not-a-token", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.e30"] {
        let error = fixture
            .service
            .verify_token(&fixture.context, token)
            .await
            .unwrap_err();
        assert_eq!(auth_error(error), AuthError::Malformed, "token {:?}", token);
    }
}

#[tokio::test]
async fn foreign_signatures_are_rejected() {
    let fixture = fixture().await;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = TokenClaims {
        jti: "forged".into(),
        sub: "alice".into(),
        role: Role::Admin,
        iat: now,
        exp: now + 60,
    };
    let token = sign(&claims, b"some-other-secret");
    let error = fixture
        .service
        .verify_token(&fixture.context, &token)
        .await
        .unwrap_err();
    assert_eq!(auth_error(error), AuthError::SignatureMismatch);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let fixture = fixture().await;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = TokenClaims {
        jti: "expired".into(),
        sub: "alice".into(),
        role: Role::Ops,
        iat: now - 120,
        exp: now,
    };
    let token = sign(&claims, SECRET);
    let error = fixture
        .service
        .verify_token(&fixture.context, &token)
        .await
        .unwrap_err();
    assert_eq!(auth_error(error), AuthError::Expired);
}

#[tokio::test]
async fn revoked_tokens_are_rejected() {
    let fixture = fixture().await;
    let issued = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap();

    let entry = fixture
        .service
        .revoke_token(&fixture.context, &issued.claims.jti, Some(issued.expires_at()))
        .await
        .unwrap();
    assert_eq!(entry.expires_at, issued.expires_at());

    let error = fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap_err();
    assert_eq!(auth_error(error), AuthError::Revoked);
}

#[tokio::test]
async fn revoke_without_expiry_uses_token_lifetime() {
    let fixture = fixture().await;
    let before = OffsetDateTime::now_utc();
    let entry = fixture
        .service
        .revoke_token(&fixture.context, "a6b0c1de-0000-4000-8000-000000000000", None)
        .await
        .unwrap();
    let lifetime = entry.expires_at - before;
    assert!(lifetime >= time::Duration::seconds(36000));
    assert!(lifetime < time::Duration::seconds(36010));
}

#[tokio::test]
async fn revoke_rejects_invalid_token_ids() {
    let fixture = fixture().await;
    for token_id in ["", "../users/admin", "a b"] {
        let error = fixture
            .service
            .revoke_token(&fixture.context, token_id, None)
            .await
            .unwrap_err();
        assert!(error.is::<InvalidTokenId>());
    }
}

#[tokio::test]
async fn expired_revocations_are_ignored_and_swept() {
    let fixture = fixture().await;
    let issued = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
    let entry = RevocationEntry {
        token_id: issued.claims.jti.clone(),
        revoked_at: past,
        expires_at: past,
    };
    let key = format!("/auth_proxy/revocations/{}", issued.claims.jti);
    Store::from(fixture.store.clone())
        .put_json(&fixture.context, &key, &entry, ExpectedVersion::Any)
        .await
        .unwrap();
    fixture
        .service
        .revoke_token(&fixture.context, "still-active", None)
        .await
        .unwrap();

    fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap();

    let deleted = fixture.service.sweep_revocations(&fixture.context).await.unwrap();
    assert_eq!(deleted, 1);
    let deleted = fixture.service.sweep_revocations(&fixture.context).await.unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn deleted_users_tokens_are_rejected() {
    let fixture = fixture().await;
    let issued = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    fixture
        .registry
        .delete_user(&fixture.context, "alice")
        .await
        .unwrap();
    let error = fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap_err();
    assert_eq!(auth_error(error), AuthError::UnknownSubject);
}

#[tokio::test]
async fn subject_check_can_be_disabled() {
    let fixture = fixture_with(TokenSecrets::new(SECRET), false).await;
    let issued = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    fixture
        .registry
        .delete_user(&fixture.context, "alice")
        .await
        .unwrap();
    fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap();
}

#[tokio::test]
async fn rotation_accepts_previous_secret_during_grace() {
    let fixture = fixture().await;
    let issued = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    fixture
        .service
        .rotate(&fixture.context, b"rotated".to_vec(), time::Duration::minutes(5));

    fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap();
    let fresh = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    fixture
        .service
        .verify_token(&fixture.context, &fresh.token)
        .await
        .unwrap();

    fixture
        .service
        .rotate(&fixture.context, b"rotated-again".to_vec(), time::Duration::ZERO);
    let error = fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap_err();
    assert_eq!(auth_error(error), AuthError::SignatureMismatch);
}

#[tokio::test]
async fn previous_secret_expires() {
    let expired = OffsetDateTime::now_utc() - time::Duration::seconds(1);
    let secrets = TokenSecrets::new(SECRET).with_previous("old", expired);
    let fixture = fixture_with(secrets, true).await;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = TokenClaims {
        jti: "old".into(),
        sub: "alice".into(),
        role: Role::Ops,
        iat: now,
        exp: now + 60,
    };
    let token = sign(&claims, b"old");
    let error = fixture
        .service
        .verify_token(&fixture.context, &token)
        .await
        .unwrap_err();
    assert_eq!(auth_error(error), AuthError::SignatureMismatch);
}

#[tokio::test]
async fn unavailable_store_is_not_an_auth_error() {
    let fixture = fixture().await;
    let issued = fixture.service.issue_token(&fixture.context, &fixture.user).unwrap();
    fixture.store.set_unavailable(true);
    let error = fixture
        .service
        .verify_token(&fixture.context, &issued.token)
        .await
        .unwrap_err();
    assert!(error.is::<Unavailable>());
    assert!(error.downcast_ref::<AuthError>().is_none());
}

#[tokio::test]
async fn token_options_from_conf() {
    let conf = AuthConf {
        token_ttl_sec: 60,
        ..AuthConf::default()
    };
    let options = TokenOptions::from(&conf);
    assert_eq!(options.ttl, Duration::from_secs(60));
    assert!(options.verify_subject);
}
