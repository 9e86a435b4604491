//! Bearer tokens for the admin API.
//!
//! Every job endpoint requires a token signed with the shared secret that
//! carries the [`ADMIN_ROLE`]. Tokens are minted by `clipflow-token`; the
//! server only validates them.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Role required by every job endpoint.
pub const ADMIN_ROLE: &str = "admin";

const DEFAULT_ISSUER: &str = "clipflow";
const DEFAULT_AUDIENCE: &str = "clipflow-api";
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Signing settings, read from `JWT_*` environment variables.
#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: default_issuer(),
            audience: default_audience(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }

    /// `JWT_SECRET` is required; `JWT_ISSUER`, `JWT_AUDIENCE` and
    /// `JWT_EXPIRATION_SECS` fall back to defaults.
    pub fn from_env() -> Option<Self> {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())?;
        let mut config = Self::new(secret);
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            config.audience = audience;
        }
        if let Some(ttl) = std::env::var("JWT_EXPIRATION_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.token_ttl_secs = ttl;
        }
        Some(config)
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Claims carried by an operator token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Operator name, recorded in request logs.
    pub sub: String,
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
    #[error("Token validation failed: {0}")]
    TokenValidation(String),
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token")]
    InvalidToken,
}

/// Issues and checks operator tokens (HS256, shared secret).
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    token_ttl_secs: u64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: &str, audience: &str, token_ttl_secs: Option<u64>) -> Self {
        Self::from_config(&JwtConfig {
            secret: secret.to_string(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            token_ttl_secs: token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        })
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    /// Returns `None` when `JWT_SECRET` is unset.
    pub fn from_env() -> Option<Self> {
        let config = JwtConfig::from_env()?;
        info!(
            issuer = %config.issuer,
            audience = %config.audience,
            ttl_secs = config.token_ttl_secs,
            "Admin token validation enabled"
        );
        Some(Self::from_config(&config))
    }

    /// Mint a token for `operator` carrying the admin role.
    pub fn issue_admin_token(&self, operator: &str) -> Result<String, JwtError> {
        self.generate_token(operator, vec![ADMIN_ROLE.to_string()])
    }

    pub fn generate_token(&self, subject: &str, roles: Vec<String>) -> Result<String, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| JwtError::TokenGeneration(e.to_string()))?
            .as_secs();

        let claims = Claims {
            sub: subject.to_string(),
            roles,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: now + self.token_ttl_secs,
            iat: now,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::TokenGeneration(e.to_string()))
    }

    /// Check signature, issuer, audience and expiry.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                ErrorKind::InvalidToken | ErrorKind::InvalidSignature => JwtError::InvalidToken,
                _ => JwtError::TokenValidation(e.to_string()),
            })
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "operator-signing-secret";

    fn service() -> JwtService {
        JwtService::from_config(&JwtConfig::new(SECRET))
    }

    #[test]
    fn test_admin_token_round_trip() {
        let service = service();
        let token = service.issue_admin_token("ops").unwrap();

        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "ops");
        assert!(claims.is_admin());
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_token_without_admin_role() {
        let service = service();
        let token = service
            .generate_token("viewer", vec!["viewer".to_string()])
            .unwrap();
        assert!(!service.validate_token(&token).unwrap().is_admin());
    }

    #[test]
    fn test_malformed_token() {
        assert!(matches!(
            service().validate_token("invalid.token.here"),
            Err(JwtError::InvalidToken) | Err(JwtError::TokenValidation(_))
        ));
    }

    #[test]
    fn test_token_signed_with_another_secret() {
        let other = JwtService::from_config(&JwtConfig::new("some-other-secret"));
        let token = other.issue_admin_token("ops").unwrap();
        assert!(matches!(
            service().validate_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_token_for_another_audience() {
        let other = JwtService::new(SECRET, DEFAULT_ISSUER, "billing-api", None);
        let token = other.issue_admin_token("ops").unwrap();
        assert!(service().validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let service = service();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            sub: "ops".to_string(),
            roles: vec![ADMIN_ROLE.to_string()],
            iss: DEFAULT_ISSUER.to_string(),
            aud: DEFAULT_AUDIENCE.to_string(),
            exp: now - 600,
            iat: now - 4200,
        };
        let token = encode(&Header::default(), &claims, &service.encoding_key).unwrap();
        assert!(matches!(
            service.validate_token(&token),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn test_config_debug_hides_secret() {
        let rendered = format!("{:?}", JwtConfig::new(SECRET));
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("clipflow-api"));
    }
}
