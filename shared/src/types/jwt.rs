use serde::{Deserialize, Serialize};

/// Which half of a token pair a JWT is.
///
/// Carried inside the signed claims so an access token can never be replayed
/// against the refresh endpoint and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims embedded in every JWT issued by the server.
///
/// Access tokens are checked statelessly (signature + expiry) and then
/// against the token family's revocation state. Refresh tokens are
/// additionally looked up by `jti` in the token store, which is where the
/// single-use rule lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Standard JWT subject, the identity the principal registered with.
    pub sub: String,

    /// Numeric user ID.
    pub uid: i64,

    /// Unique token id. For refresh tokens this is the token store key.
    pub jti: String,

    /// Token family: every pair rotated from one login shares it.
    /// Revoking the family ends the whole session lineage.
    pub fid: String,

    pub kind: TokenKind,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: i64,

    /// Expiry (Unix timestamp, seconds). Expired once `now >= exp`.
    pub exp: i64,
}

impl JwtClaims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}
