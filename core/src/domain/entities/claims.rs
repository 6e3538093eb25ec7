//! Claim set embedded in every signed session token.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::session::SessionData;

/// Wire name of the subject identifier claim
pub const SUBJECT_CLAIM: &str = "uuid";

/// Wire name of the issued-at claim (unix seconds)
pub const ISSUED_AT_CLAIM: &str = "iat";

/// Wire name of the expiry claim (unix seconds)
pub const EXPIRES_AT_CLAIM: &str = "exp";

/// Wire name of the persistence identifier claim
pub const PERSIST_ID_CLAIM: &str = "persistKey";

/// Claim names callers may not set through application data
pub const RESERVED_CLAIMS: [&str; 4] = [SUBJECT_CLAIM, ISSUED_AT_CLAIM, EXPIRES_AT_CLAIM, PERSIST_ID_CLAIM];

/// Lifetime of tokens issued to a trusted `source` (effectively never expires)
pub const TRUSTED_SOURCE_LIFETIME_HOURS: i64 = 999_999;

/// Claims structure for the token payload
///
/// Fixed protocol fields are typed; everything the caller supplied travels
/// in `extra` and is flattened into the payload next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Uuid>,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Registry handle of this token, present only in storage-backed mode
    #[serde(rename = "persistKey", default, skip_serializing_if = "Option::is_none")]
    pub persist_id: Option<String>,

    /// Caller-supplied application fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Builds the claim set for a new token
    ///
    /// # Arguments
    ///
    /// * `data` - Application data to embed
    /// * `issued_at` - Issue instant
    /// * `lifetime` - Token lifetime, ignored for trusted sources
    /// * `persist_id` - Registry handle when storage is configured
    ///
    /// # Returns
    ///
    /// Claims expiring at `issued_at + lifetime`, or at the far-future
    /// sentinel when `data` carries a `source` field
    pub fn issue(
        data: SessionData,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
        persist_id: Option<String>,
    ) -> Self {
        let lifetime = if data.is_trusted_source() {
            Duration::hours(TRUSTED_SOURCE_LIFETIME_HOURS)
        } else {
            lifetime
        };
        let exp = issued_at
            .checked_add_signed(lifetime)
            .map(|expiry| expiry.timestamp())
            .unwrap_or(i64::MAX);
        let (subject, extra) = data.into_parts();

        Self {
            subject,
            iat: issued_at.timestamp(),
            exp,
            persist_id,
            extra,
        }
    }

    /// Last valid instant of the token, in unix milliseconds
    pub fn expires_at_millis(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }

    /// Checks if the claims have expired at the given unix time in milliseconds
    ///
    /// The token is still valid at the `exp` instant itself.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_millis()
    }

    /// Checks if the claims have expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Whether the token was issued to a trusted `source`
    pub fn is_trusted_source(&self) -> bool {
        self.extra.contains_key(super::session::TRUSTED_SOURCE_FIELD)
    }

    /// Strips the protocol fields and returns the application data
    pub fn into_session_data(self) -> SessionData {
        SessionData::from_parts(self.subject, self.extra)
    }
}
