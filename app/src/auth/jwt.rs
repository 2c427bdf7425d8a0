use std::fs;

use anyhow::{Context, Result};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::*;

use super::{AuthError, Claims, TokenVerifier};
use crate::config::{AuthConfig, KeySource};

/// Verifies JWTs issued by `https://<domain>/` for a single audience.
pub struct JwtVerifier {
    keys: Keys,
    validation: Validation,
}

enum Keys {
    /// RS256 keys from a JSON Web Key Set, by `kid`.
    Published(Vec<(String, DecodingKey)>),
    /// HS256 shared secret.
    Shared(DecodingKey),
}

impl JwtVerifier {
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let issuer = config.issuer()?;
        info!("Verifying tokens from {} for {}", issuer, config.audience);
        match &config.keys {
            KeySource::Jwks(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("read key set {:?}", path))?;
                let set: JwkSet = serde_json::from_str(&json)
                    .with_context(|| format!("parse key set {:?}", path))?;
                Self::with_jwks(&set, issuer.as_str(), &config.audience)
            }
            KeySource::Secret(secret) => Ok(Self::with_secret(
                secret.as_bytes(),
                issuer.as_str(),
                &config.audience,
            )),
        }
    }

    pub fn with_jwks(set: &JwkSet, issuer: &str, audience: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for jwk in set.keys.iter() {
            let kid = match &jwk.common.key_id {
                Some(kid) => kid.clone(),
                None => {
                    warn!("Skipping key without kid");
                    continue;
                }
            };
            let key = DecodingKey::from_jwk(jwk).with_context(|| format!("key {}", kid))?;
            debug!("Loaded key {}", kid);
            keys.push((kid, key));
        }
        if keys.is_empty() {
            warn!("Key set contains no usable keys; every token will be refused");
        }
        Ok(JwtVerifier {
            keys: Keys::Published(keys),
            validation: validation(Algorithm::RS256, issuer, audience),
        })
    }

    pub fn with_secret(secret: &[u8], issuer: &str, audience: &str) -> Self {
        JwtVerifier {
            keys: Keys::Shared(DecodingKey::from_secret(secret)),
            validation: validation(Algorithm::HS256, issuer, audience),
        }
    }

    fn key_for(&self, token: &str) -> Result<&DecodingKey, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!("Unreadable token header: {}", e);
            AuthError::InvalidSignature
        })?;
        match &self.keys {
            Keys::Shared(key) => Ok(key),
            Keys::Published(keys) => {
                let kid = header.kid.ok_or(AuthError::InvalidSignature)?;
                keys.iter()
                    .find(|(k, _)| *k == kid)
                    .map(|(_, key)| key)
                    .ok_or_else(|| {
                        debug!("Unknown kid: {:?}", kid);
                        AuthError::InvalidSignature
                    })
            }
        }
    }
}

fn validation(alg: Algorithm, issuer: &str, audience: &str) -> Validation {
    let mut validation = Validation::new(alg);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation
}

fn classify(err: JwtError) -> AuthError {
    debug!("Token refused: {}", err);
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Json(_) => AuthError::MalformedClaims,
        _ => AuthError::InvalidSignature,
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let key = self.key_for(token)?;
        let data = decode::<Claims>(token, key, &self.validation).map_err(classify)?;
        Ok(data.claims)
    }
}
