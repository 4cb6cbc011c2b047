use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use shared::types::server_config::AuthConfig;
use shared::types::{
    AuthError, AuthenticationRequest, AuthenticationResponse, JwtClaims, RegisterRequest, TokenKind,
};
use tracing::{debug, error, info, warn};

use crate::auth::identity::{IdentityStore, NewIdentity, Principal};
use crate::auth::store::{TokenRecord, TokenState, TokenStore};
use crate::database::utils::{
    get_timestamp, hash_password, new_token_id, sanitize_name, verify_password,
};
use crate::database::StoreError;

const MAX_SUBJECT_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// Hash verified against when the identity does not exist, so an unknown
/// identity costs the same as a wrong password.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" for issuance and expiry checks, in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        get_timestamp()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Policy / pair
// ---------------------------------------------------------------------------

/// Token lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl TokenPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            access_ttl_secs: config.access_token_expiry_secs(),
            refresh_ttl_secs: config.refresh_token_expiry_secs(),
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

/// A freshly issued access/refresh pair. Never mutated; refresh issues a new one.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: i64,
    /// Access token expiry.
    pub expires_at: i64,
    pub refresh_expires_at: i64,
    pub principal: Principal,
}

impl TokenPair {
    /// Metadata-only body for register / authenticate.
    pub fn to_response(&self, message: &str) -> AuthenticationResponse {
        AuthenticationResponse::Success {
            user_id: self.principal.user_id,
            email: self.principal.subject.clone(),
            token_type: "Bearer".to_string(),
            expires_in: u64::try_from(self.expires_at - self.issued_at).unwrap_or(0),
            refresh_expires_in: u64::try_from(self.refresh_expires_at - self.issued_at).unwrap_or(0),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            message: message.to_string(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("principal", &self.principal)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Issues, rotates, revokes and validates token pairs.
///
/// Refresh tokens are single-use. Every pair rotated out of one login shares
/// a family id; presenting a refresh token that was already rotated revokes
/// the whole family.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    policy: TokenPolicy,
    identities: Arc<dyn IdentityStore>,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        secret: &str,
        policy: TokenPolicy,
        identities: Arc<dyn IdentityStore>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against `clock`, not the system time.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            policy,
            identities,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Create a principal and issue its first pair.
    pub async fn register(&self, request: &RegisterRequest) -> Result<TokenPair, AuthError> {
        let subject = normalize_subject(&request.email).ok_or(AuthError::InvalidCredentials)?;
        check_password(&request.password)?;

        let password = request.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| internal("hash task failed", e))?
            .map_err(|e| internal("password hashing failed", e))?;

        let principal = self
            .identities
            .create(NewIdentity {
                subject,
                firstname: sanitize_name(&request.firstname),
                lastname: sanitize_name(&request.lastname),
                password_hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => AuthError::DuplicateIdentity,
                other => store_failure(other),
            })?;

        info!("Registered user_id={} subject={}", principal.user_id, principal.subject);
        self.issue(&principal, &new_token_id()).await
    }

    /// Verify credentials and start a new token family.
    pub async fn authenticate(&self, request: &AuthenticationRequest) -> Result<TokenPair, AuthError> {
        let subject = normalize_subject(&request.email).ok_or(AuthError::InvalidCredentials)?;

        let record = self
            .identities
            .find_by_subject(&subject)
            .await
            .map_err(store_failure)?;

        let stored_hash = record.as_ref().map(|r| r.password_hash.clone());
        let password = request.password.clone();
        let verified = tokio::task::spawn_blocking(move || {
            let hash = match stored_hash {
                Some(hash) => hash,
                None => DUMMY_HASH
                    .get_or_init(|| hash_password("dummy-password-for-timing").unwrap_or_default())
                    .clone(),
            };
            verify_password(&hash, &password).unwrap_or(false)
        })
        .await
        .map_err(|e| internal("verify task failed", e))?;

        match record {
            Some(record) if verified => {
                info!("Authenticated user_id={}", record.principal.user_id);
                self.issue(&record.principal, &new_token_id()).await
            }
            _ => {
                warn!("Authentication failed for subject={}", subject);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Rotate a refresh token: the presented token becomes REFRESHED and a new
    /// pair is issued in the same family.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode_kind(refresh_token, TokenKind::Refresh)?;
        if claims.is_expired_at(self.clock.now()) {
            debug!("Expired refresh token presented, jti={}", claims.jti);
            return Err(AuthError::ExpiredToken);
        }

        let record = self
            .store
            .get(&claims.jti)
            .await
            .map_err(store_failure)?
            .ok_or(AuthError::InvalidToken)?;

        if record.family_id != claims.fid || record.user_id != claims.uid {
            warn!("Refresh token claims do not match stored record, jti={}", claims.jti);
            return Err(AuthError::InvalidToken);
        }

        match record.state {
            TokenState::Revoked => return Err(AuthError::RevokedToken),
            TokenState::Refreshed => return Err(self.reuse_detected(&record).await),
            TokenState::Valid => {}
        }

        // A record inserted by a rotation that raced a family revocation.
        if self
            .store
            .family_revoked(&record.family_id)
            .await
            .map_err(store_failure)?
        {
            return Err(AuthError::RevokedToken);
        }

        let won = self
            .store
            .transition(&record.token_id, TokenState::Valid, TokenState::Refreshed)
            .await
            .map_err(store_failure)?;
        if !won {
            // Another presentation of the same token got there first.
            return Err(self.reuse_detected(&record).await);
        }

        let principal = Principal {
            user_id: claims.uid,
            subject: claims.sub,
        };
        debug!("Rotated refresh token for user_id={}", principal.user_id);
        self.issue(&principal, &record.family_id).await
    }

    /// Revoke the family of the presented refresh token.
    ///
    /// Expired tokens are still accepted here; revoking them is harmless.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.decode_kind(refresh_token, TokenKind::Refresh)?;

        if self.store.get(&claims.jti).await.map_err(store_failure)?.is_none() {
            return Err(AuthError::InvalidToken);
        }

        let revoked = self
            .store
            .revoke_family(&claims.fid)
            .await
            .map_err(store_failure)?;
        info!("Revoked {} token(s) for user_id={}", revoked, claims.uid);
        Ok(())
    }

    /// Check an access token and return who it belongs to.
    pub async fn validate_access(&self, access_token: &str) -> Result<Principal, AuthError> {
        let claims = self.decode_kind(access_token, TokenKind::Access)?;
        if claims.is_expired_at(self.clock.now()) {
            return Err(AuthError::ExpiredToken);
        }

        if self
            .store
            .family_revoked(&claims.fid)
            .await
            .map_err(store_failure)?
        {
            return Err(AuthError::RevokedToken);
        }

        Ok(Principal {
            user_id: claims.uid,
            subject: claims.sub,
        })
    }

    async fn reuse_detected(&self, record: &TokenRecord) -> AuthError {
        warn!(
            "Refresh token reuse detected, revoking family for user_id={}",
            record.user_id
        );
        match self.store.revoke_family(&record.family_id).await {
            Ok(_) => AuthError::RevokedToken,
            Err(e) => store_failure(e),
        }
    }

    fn decode_kind(&self, token: &str, kind: TokenKind) -> Result<JwtClaims, AuthError> {
        let claims = decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                debug!("JWT rejected: {}", e);
                AuthError::InvalidToken
            })?
            .claims;

        if claims.kind != kind {
            debug!("JWT kind mismatch: expected {:?}, got {:?}", kind, claims.kind);
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    async fn issue(&self, principal: &Principal, family_id: &str) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let access_exp = now.saturating_add(ttl_offset(self.policy.access_ttl_secs));
        let refresh_exp = now.saturating_add(ttl_offset(self.policy.refresh_ttl_secs));

        let access = self.sign(principal, family_id, TokenKind::Access, now, access_exp)?;
        let refresh_id = new_token_id();
        let refresh = self.sign_with_id(
            principal,
            &refresh_id,
            family_id,
            TokenKind::Refresh,
            now,
            refresh_exp,
        )?;

        let stored = self
            .store
            .insert(TokenRecord {
                token_id: refresh_id,
                family_id: family_id.to_string(),
                user_id: principal.user_id,
                state: TokenState::Valid,
                issued_at: now,
                expires_at: refresh_exp,
            })
            .await
            .map_err(store_failure)?;
        if stored == TokenState::Revoked {
            warn!("Family {} was revoked while a rotation was in flight", family_id);
            return Err(AuthError::RevokedToken);
        }

        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
            issued_at: now,
            expires_at: access_exp,
            refresh_expires_at: refresh_exp,
            principal: principal.clone(),
        })
    }

    fn sign(
        &self,
        principal: &Principal,
        family_id: &str,
        kind: TokenKind,
        iat: i64,
        exp: i64,
    ) -> Result<String, AuthError> {
        self.sign_with_id(principal, &new_token_id(), family_id, kind, iat, exp)
    }

    fn sign_with_id(
        &self,
        principal: &Principal,
        jti: &str,
        family_id: &str,
        kind: TokenKind,
        iat: i64,
        exp: i64,
    ) -> Result<String, AuthError> {
        let claims = JwtClaims {
            sub: principal.subject.clone(),
            uid: principal.user_id,
            jti: jti.to_string(),
            fid: family_id.to_string(),
            kind,
            iat,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| internal("JWT encoding failed", e))
    }
}

/// Trimmed, lowercased identity. `None` if empty, too long or containing
/// whitespace or control characters.
pub fn normalize_subject(raw: &str) -> Option<String> {
    let subject = raw.trim().to_lowercase();
    if subject.is_empty()
        || subject.len() > MAX_SUBJECT_LEN
        || subject.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return None;
    }
    Some(subject)
}

fn ttl_offset(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn check_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

fn store_failure(e: StoreError) -> AuthError {
    internal("token store failure", e)
}

fn internal(context: &str, e: impl fmt::Display) -> AuthError {
    error!("{}: {}", context, e);
    AuthError::Internal(format!("{}: {}", context, e))
}
