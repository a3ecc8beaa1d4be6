//! Signed, time-bounded access tokens.
//!
//! Tokens are compact JWS (JWT) values signed with HMAC-SHA256:
//! `base64url(header).base64url(claims).base64url(signature)`. Any JWT
//! library given the same key, issuer and audience can verify them.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use common::{AccountId, Clock};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use serde_json::value::RawValue;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// The only signing algorithm issued and accepted.
pub const ALGORITHM: &str = "HS256";

/// Minimum signing key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// Settings shared by token issuance and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub signing_key: SecretString,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

/// A freshly issued token.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// JWT `NumericDate`: seconds since the epoch, written with a decimal
/// fraction when the instant is not on a whole second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumericDate(DateTime<Utc>);

impl Serialize for NumericDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = self.0.timestamp();
        if secs < 0 {
            return Err(ser::Error::custom("NumericDate before the epoch"));
        }
        // Leap seconds report nanos above one second.
        let nanos = self.0.timestamp_subsec_nanos().min(999_999_999);
        let text = if nanos == 0 {
            secs.to_string()
        } else {
            let fraction = format!("{nanos:09}");
            format!("{secs}.{}", fraction.trim_end_matches('0'))
        };
        RawValue::from_string(text)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NumericDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        parse_numeric_date(raw.get())
            .map(NumericDate)
            .ok_or_else(|| de::Error::custom("invalid NumericDate"))
    }
}

/// Parses a JSON number as a non-negative instant, exact to the nanosecond
/// for plain decimals.
fn parse_numeric_date(text: &str) -> Option<DateTime<Utc>> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let is_plain = !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit());

    if !is_plain {
        let value: f64 = text.parse().ok()?;
        if !value.is_finite() || value < 0.0 || value >= i64::MAX as f64 {
            return None;
        }
        let nanos = (value.fract() * 1e9) as u32;
        return DateTime::from_timestamp(value.trunc() as i64, nanos);
    }

    let secs: i64 = whole.parse().ok()?;
    let digits: String = fraction.chars().take(9).collect();
    let nanos = if digits.is_empty() {
        0
    } else {
        format!("{digits:0<9}").parse().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    aud: Audience,
    iat: NumericDate,
    exp: NumericDate,
    jti: String,
}

/// Issues and validates access tokens.
///
/// Stateless apart from its configuration; safe to share across tasks.
pub struct TokenService {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Creates a token service.
    ///
    /// Fails with [`TokenError::Configuration`] if the signing key is shorter
    /// than [`MIN_KEY_LEN`] bytes or the time-to-live is not positive.
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let key_len = config.signing_key.expose_secret().len();
        if key_len < MIN_KEY_LEN {
            return Err(TokenError::Configuration(format!(
                "signing key must be at least {MIN_KEY_LEN} bytes, got {key_len}"
            )));
        }
        if config.ttl <= Duration::zero() {
            return Err(TokenError::Configuration(
                "token time-to-live must be positive".to_string(),
            ));
        }

        Ok(Self { config, clock })
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn audience(&self) -> &str {
        &self.config.audience
    }

    /// Issues a token for `subject`, valid from now for the configured
    /// time-to-live. `iat` and `exp` keep the clock's sub-second part, so
    /// the token expires exactly one time-to-live after issue.
    #[tracing::instrument(skip(self))]
    pub fn issue(&self, subject: AccountId) -> Result<IssuedToken, TokenError> {
        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(self.config.ttl)
            .ok_or_else(|| TokenError::Encoding("expiry out of range".to_string()))?;

        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.config.issuer.clone(),
            aud: Audience::One(self.config.audience.clone()),
            iat: NumericDate(issued_at),
            exp: NumericDate(expires_at),
            jti: Uuid::new_v4().to_string(),
        };

        let signing_input = format!("{}.{}", encode_part(&header)?, encode_part(&claims)?);
        let signature = self.mac(&signing_input)?.finalize().into_bytes();
        let token = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature));

        tracing::debug!(%expires_at, "token issued");
        Ok(IssuedToken { token, expires_at })
    }

    /// Validates a token and returns its subject.
    ///
    /// The signature is checked first; claims of a token that fails it are
    /// never looked at.
    #[tracing::instrument(skip_all)]
    pub fn validate(&self, token: &str) -> Result<AccountId, TokenError> {
        self.check(token).inspect_err(|e| {
            metrics::counter!("token_validation_failures_total", "reason" => e.reason())
                .increment(1);
            tracing::debug!(error = %e, "token rejected");
        })
    }

    fn check(&self, token: &str) -> Result<AccountId, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_part(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::InvalidSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        self.mac(signing_input)?
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: Claims = decode_part(claims_b64)?;

        if self.clock.now() >= claims.exp.0 {
            return Err(TokenError::Expired);
        }
        if claims.iss != self.config.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if !claims.aud.contains(&self.config.audience) {
            return Err(TokenError::InvalidAudience);
        }

        let subject = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)?;
        Ok(AccountId::from_uuid(subject))
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha256, TokenError> {
        let mut mac =
            HmacSha256::new_from_slice(self.config.signing_key.expose_secret().as_bytes())
                .map_err(|e| TokenError::Configuration(e.to_string()))?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }
}

fn encode_part<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use common::FixedClock;

    use super::*;

    const KEY_1: &str = "k1-0123456789abcdef0123456789abcdef";
    const KEY_2: &str = "k2-0123456789abcdef0123456789abcdef";

    fn config(key: &str) -> TokenConfig {
        TokenConfig {
            signing_key: SecretString::from(key),
            issuer: "online-store".to_string(),
            audience: "online-store-clients".to_string(),
            ttl: Duration::seconds(3600),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn service_with(config: TokenConfig) -> (TokenService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let service = TokenService::new(config, clock.clone()).unwrap();
        (service, clock)
    }

    fn service() -> (TokenService, Arc<FixedClock>) {
        service_with(config(KEY_1))
    }

    fn claims_of(token: &str) -> serde_json::Value {
        let payload = token.split('.').nth(1).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
    }

    #[test]
    fn test_issued_token_validates_to_subject() {
        let (service, _) = service();
        let subject = AccountId::new();

        let issued = service.issue(subject).unwrap();

        assert_eq!(issued.expires_at, start() + Duration::seconds(3600));
        assert_eq!(service.validate(&issued.token).unwrap(), subject);
    }

    #[test]
    fn test_token_carries_standard_claims() {
        let (service, _) = service();
        let subject = AccountId::new();
        let issued = service.issue(subject).unwrap();

        let claims = claims_of(&issued.token);
        assert_eq!(claims["sub"], subject.to_string());
        assert_eq!(claims["iss"], "online-store");
        assert_eq!(claims["aud"], "online-store-clients");
        assert_eq!(claims["iat"], start().timestamp());
        assert_eq!(claims["exp"], start().timestamp() + 3600);
        assert!(claims["jti"].is_string());

        let other = service.issue(subject).unwrap();
        assert_ne!(claims_of(&other.token)["jti"], claims["jti"]);
    }

    #[test]
    fn test_signature_is_standard_hs256() {
        let (service, _) = service();
        let issued = service.issue(AccountId::new()).unwrap();

        let (signing_input, signature) = issued.token.rsplit_once('.').unwrap();
        let mut mac = HmacSha256::new_from_slice(KEY_1.as_bytes()).unwrap();
        mac.update(signing_input.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(signature, expected);

        let header: serde_json::Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(issued.token.split('.').next().unwrap())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
    }

    #[test]
    fn test_valid_until_just_before_expiry() {
        let (service, clock) = service();
        let subject = AccountId::new();
        let issued = service.issue(subject).unwrap();

        for offset in [0, 1, 1800, 3599] {
            clock.set(start() + Duration::seconds(offset));
            assert_eq!(service.validate(&issued.token), Ok(subject));
        }

        clock.set(start() + Duration::seconds(3600) - Duration::milliseconds(1));
        assert_eq!(service.validate(&issued.token), Ok(subject));
    }

    #[test]
    fn test_expiry_keeps_sub_second_issue_time() {
        let (service, clock) = service();
        let issued_at = start() + Duration::milliseconds(900);
        clock.set(issued_at);
        let subject = AccountId::new();

        let issued = service.issue(subject).unwrap();
        let expires_at = issued_at + Duration::seconds(3600);
        assert_eq!(issued.expires_at, expires_at);

        let payload = issued.token.split('.').nth(1).unwrap();
        let payload = String::from_utf8(URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert!(payload.contains(&format!(r#""iat":{}.9,"#, start().timestamp())));
        assert!(payload.contains(&format!(r#""exp":{}.9,"#, start().timestamp() + 3600)));

        clock.set(expires_at - Duration::milliseconds(500));
        assert_eq!(service.validate(&issued.token), Ok(subject));
        clock.set(expires_at - Duration::nanoseconds(1));
        assert_eq!(service.validate(&issued.token), Ok(subject));

        clock.set(expires_at);
        assert_eq!(service.validate(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_numeric_dates_parse_exactly() {
        let whole = start().timestamp();
        assert_eq!(parse_numeric_date(&whole.to_string()), Some(start()));
        assert_eq!(
            parse_numeric_date(&format!("{whole}.000000001")),
            Some(start() + Duration::nanoseconds(1))
        );
        assert_eq!(
            parse_numeric_date(&format!("{whole}.25")),
            Some(start() + Duration::milliseconds(250))
        );
        assert_eq!(parse_numeric_date("1.5e3"), DateTime::from_timestamp(1500, 0));
        assert_eq!(parse_numeric_date("-1"), None);
        assert_eq!(parse_numeric_date("\"soon\""), None);
    }

    #[test]
    fn test_expired_at_and_after_expiry() {
        let (service, clock) = service();
        let issued = service.issue(AccountId::new()).unwrap();

        for offset in [3600, 3601, 86_400] {
            clock.set(start() + Duration::seconds(offset));
            assert_eq!(service.validate(&issued.token), Err(TokenError::Expired));
        }
    }

    #[test]
    fn test_other_key_fails_signature() {
        let (issuer, _) = service();
        let (verifier, _) = service_with(config(KEY_2));
        let issued = issuer.issue(AccountId::new()).unwrap();

        assert_eq!(
            verifier.validate(&issued.token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_signature_is_checked_before_expiry() {
        let (issuer, _) = service();
        let (verifier, clock) = service_with(config(KEY_2));
        let issued = issuer.issue(AccountId::new()).unwrap();

        clock.advance(Duration::days(30));
        assert_eq!(
            verifier.validate(&issued.token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_claims_fail_signature() {
        let (service, _) = service();
        let issued = service.issue(AccountId::new()).unwrap();

        let mut claims = claims_of(&issued.token);
        claims["sub"] = serde_json::Value::String(AccountId::new().to_string());
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

        let mut parts: Vec<&str> = issued.token.split('.').collect();
        parts[1] = forged_payload.as_str();
        let forged = parts.join(".");

        assert_eq!(service.validate(&forged), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_other_algorithms_are_refused() {
        let (service, _) = service();
        let issued = service.issue(AccountId::new()).unwrap();
        let rest = issued.token.split_once('.').unwrap().1;

        for alg in ["none", "HS512", "RS256"] {
            let header = URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"{alg}","typ":"JWT"}}"#));
            let token = format!("{header}.{rest}");
            assert_eq!(service.validate(&token), Err(TokenError::InvalidSignature));
        }
    }

    #[test]
    fn test_issuer_mismatch() {
        let (issuer, _) = service_with(TokenConfig {
            issuer: "someone-else".to_string(),
            ..config(KEY_1)
        });
        let (verifier, _) = service();
        let issued = issuer.issue(AccountId::new()).unwrap();

        assert_eq!(
            verifier.validate(&issued.token),
            Err(TokenError::InvalidIssuer)
        );
    }

    #[test]
    fn test_audience_mismatch() {
        let (issuer, _) = service_with(TokenConfig {
            audience: "admin-console".to_string(),
            ..config(KEY_1)
        });
        let (verifier, _) = service();
        let issued = issuer.issue(AccountId::new()).unwrap();

        assert_eq!(
            verifier.validate(&issued.token),
            Err(TokenError::InvalidAudience)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let (service, _) = service();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.###.$$$"] {
            assert_eq!(service.validate(token), Err(TokenError::Malformed));
        }
    }

    #[test]
    fn test_short_key_is_a_configuration_error() {
        let clock = Arc::new(FixedClock::new(start()));
        let result = TokenService::new(config("too-short"), clock.clone());
        assert!(matches!(result, Err(TokenError::Configuration(_))));

        let result = TokenService::new(
            TokenConfig {
                ttl: Duration::zero(),
                ..config(KEY_1)
            },
            clock,
        );
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let (service, _) = service();
        let issued = service.issue(AccountId::new()).unwrap();
        assert!(!format!("{issued:?}").contains(&issued.token));
    }
}
