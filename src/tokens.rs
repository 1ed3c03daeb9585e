use crate::error::{AppError, AppResult};
use crate::model::{Account, Role};
use anyhow::anyhow;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String, // account id
    role: Role,
    key: String,
    aud: String, // workspace id
    iat: i64,
    exp: i64,
}

/// Decoded, verified identity carried by every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub account_id: i64,
    pub role: Role,
    pub external_key: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

pub struct IssuedToken {
    pub token: String,
    pub assertion: Assertion,
}

/// HS256 token issuer/verifier. The secret is injected from configuration.
/// Tokens name the workspace they were issued in as their audience; account
/// ids are only meaningful inside that workspace.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "aud"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, account: &Account, workspace_id: &str) -> AppResult<IssuedToken> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign(Claims {
            sub: account.id.to_string(),
            role: account.role,
            key: account.external_key.clone(),
            aud: workspace_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        })
    }

    fn sign(&self, claims: Claims) -> AppResult<IssuedToken> {
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Storage(anyhow!("token signing failed: {e}")))?;
        let assertion = claims_to_assertion(claims)?;
        Ok(IssuedToken { token, assertion })
    }

    /// Checks signature and expiry. With `workspace_id` set, the token must
    /// also have been issued for that workspace.
    pub fn verify(&self, token: &str, workspace_id: Option<&str>) -> AppResult<Assertion> {
        let mut validation = self.validation.clone();
        match workspace_id {
            Some(id) => validation.set_audience(&[id]),
            None => validation.validate_aud = false,
        }
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::ExpiredAssertion,
                _ => AppError::InvalidAssertion,
            }
        })?;
        claims_to_assertion(data.claims)
    }
}

fn claims_to_assertion(claims: Claims) -> AppResult<Assertion> {
    let account_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::InvalidAssertion)?;
    Ok(Assertion {
        account_id,
        role: claims.role,
        external_key: claims.key,
        issued_at: claims.iat,
        expires_at: claims.exp,
    })
}
