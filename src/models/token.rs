use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::capability::CapabilitySet;

pub const DEFAULT_PURPOSE: &str = "accountToken";

const TOKEN_PREFIX: &str = "iam_v1_";

/// Longest finite lifespan accepted: 100 years.
pub const MAX_LIFESPAN_SECS: u64 = 100 * 365 * 24 * 3600;

/// How long an issued token lives.
///
/// On the wire this is `expiresIn`: `-1` means the token never expires,
/// any positive integer is a lifetime in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Lifespan {
    Infinite,
    Seconds(u64),
}

impl Lifespan {
    pub fn token_type(&self) -> TokenType {
        match self {
            Lifespan::Infinite => TokenType::Persistent,
            Lifespan::Seconds(_) => TokenType::EphemeralServiceAccount,
        }
    }

    /// Expiry for a token issued (or renewed) at `from`. `None` = never.
    pub fn expires_at(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Lifespan::Infinite => None,
            Lifespan::Seconds(secs) => {
                let secs = (*secs).min(MAX_LIFESPAN_SECS) as i64;
                let expiry = Duration::try_seconds(secs)
                    .and_then(|d| from.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                Some(expiry)
            }
        }
    }

    pub fn as_secs(&self) -> Option<i64> {
        match self {
            Lifespan::Infinite => None,
            Lifespan::Seconds(secs) => Some(*secs as i64),
        }
    }
}

impl TryFrom<i64> for Lifespan {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            -1 => Ok(Lifespan::Infinite),
            n if n > 0 && n as u64 <= MAX_LIFESPAN_SECS => Ok(Lifespan::Seconds(n as u64)),
            n if n > 0 => Err(format!(
                "invalid lifespan {}: at most {} seconds allowed",
                n, MAX_LIFESPAN_SECS
            )),
            n => Err(format!("invalid lifespan {}: expected -1 or a positive number of seconds", n)),
        }
    }
}

impl From<Lifespan> for i64 {
    fn from(l: Lifespan) -> Self {
        match l {
            Lifespan::Infinite => -1,
            Lifespan::Seconds(secs) => secs as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenType {
    Persistent,
    EphemeralServiceAccount,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Persistent => "persistent",
            TokenType::EphemeralServiceAccount => "ephemeralServiceAccount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "persistent" => Some(TokenType::Persistent),
            "ephemeralServiceAccount" => Some(TokenType::EphemeralServiceAccount),
            _ => None,
        }
    }
}

/// Deduplication key for idempotent issuance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub account_id: String,
    pub purpose: String,
    pub inquirer: String,
}

impl Fingerprint {
    /// Stable string used to derive the Postgres advisory lock key.
    pub fn lock_key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.account_id, self.purpose, self.inquirer)
    }
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: Uuid,
    /// The bearer credential value.
    pub token: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub purpose: String,
    pub initiator: String,
    pub inquirer: String,
    pub description: String,
    pub permissions: CapabilitySet,
    #[serde(rename = "expiresIn")]
    pub lifespan: Lifespan,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            account_id: self.account_id.clone(),
            purpose: self.purpose.clone(),
            inquirer: self.inquirer.clone(),
        }
    }

    pub fn matches(&self, fp: &Fingerprint) -> bool {
        self.account_id == fp.account_id && self.purpose == fp.purpose && self.inquirer == fp.inquirer
    }

    /// Expired tokens are treated as absent by every read path.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => exp > now,
        }
    }
}

/// Generate a fresh bearer value: 24 bytes of OS randomness, hex encoded.
pub fn generate_token_value() -> String {
    let mut random_bytes = [0u8; 24];
    OsRng.fill_bytes(&mut random_bytes);
    format!("{}{}", TOKEN_PREFIX, hex::encode(random_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(expires_at: Option<DateTime<Utc>>) -> Token {
        Token {
            id: Uuid::new_v4(),
            token: generate_token_value(),
            account_id: "acc-1".into(),
            token_type: TokenType::EphemeralServiceAccount,
            purpose: DEFAULT_PURPOSE.into(),
            initiator: "admin".into(),
            inquirer: "flow-service".into(),
            description: String::new(),
            permissions: CapabilitySet::new(),
            lifespan: Lifespan::Seconds(60),
            issued_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_lifespan_sentinel_maps_to_persistent() {
        let l = Lifespan::try_from(-1).unwrap();
        assert_eq!(l, Lifespan::Infinite);
        assert_eq!(l.token_type(), TokenType::Persistent);
        assert!(l.expires_at(Utc::now()).is_none());
    }

    #[test]
    fn test_positive_lifespan_is_ephemeral() {
        let l = Lifespan::try_from(3600).unwrap();
        assert_eq!(l, Lifespan::Seconds(3600));
        assert_eq!(l.token_type(), TokenType::EphemeralServiceAccount);
        let now = Utc::now();
        assert_eq!(l.expires_at(now), Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_invalid_lifespans_rejected() {
        assert!(Lifespan::try_from(0).is_err());
        assert!(Lifespan::try_from(-2).is_err());
        assert!(serde_json::from_str::<Lifespan>("-5").is_err());
    }

    #[test]
    fn test_oversized_lifespan_rejected() {
        assert!(Lifespan::try_from(MAX_LIFESPAN_SECS as i64).is_ok());
        assert!(Lifespan::try_from(MAX_LIFESPAN_SECS as i64 + 1).is_err());
        assert!(Lifespan::try_from(9_000_000_000_000_000).is_err());
        assert!(Lifespan::try_from(i64::MAX).is_err());
    }

    #[test]
    fn test_expiry_never_overflows() {
        let now = Utc::now();
        // Constructed directly, bypassing the wire bound.
        let huge = Lifespan::Seconds(u64::MAX);
        let capped = now + Duration::seconds(MAX_LIFESPAN_SECS as i64);
        assert_eq!(huge.expires_at(now), Some(capped));

        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        assert_eq!(
            Lifespan::Seconds(3600 * 48).expires_at(near_end),
            Some(DateTime::<Utc>::MAX_UTC)
        );
    }

    #[test]
    fn test_lifespan_wire_format() {
        assert_eq!(serde_json::to_string(&Lifespan::Infinite).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Lifespan::Seconds(30)).unwrap(), "30");
    }

    #[test]
    fn test_is_live() {
        let now = Utc::now();
        assert!(sample(None).is_live(now));
        assert!(sample(Some(now + Duration::seconds(5))).is_live(now));
        assert!(!sample(Some(now - Duration::seconds(5))).is_live(now));
        assert!(!sample(Some(now)).is_live(now));
    }

    #[test]
    fn test_token_values_are_unique_and_prefixed() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_ne!(a, b);
        assert!(a.starts_with("iam_v1_"));
        assert_eq!(a.len(), TOKEN_PREFIX.len() + 48);
    }

    #[test]
    fn test_token_serializes_camel_case() {
        let t = sample(None);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "ephemeralServiceAccount");
        assert_eq!(json["accountId"], "acc-1");
        assert_eq!(json["expiresIn"], 60);
        assert!(json["expiresAt"].is_null());
    }
}
