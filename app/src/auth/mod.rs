//! Bearer-token authorization.
//!
//! Every operation other than the public listing passes through
//! [`PermissionGate::authorize`] before it touches the store. The gate pulls
//! the token out of the `Authorization` header, hands it to a
//! [`TokenVerifier`] and then checks that the verified claims grant the
//! permission the operation needs.

use std::fmt;
use std::sync::Arc;

use actix_web::{http::header, HttpRequest};
use err_derive::Error;
use log::*;
use serde::{Deserialize, Serialize};

pub mod jwt;

pub use self::jwt::JwtVerifier;

pub mod permissions {
    pub const GET_DRINKS_DETAIL: &str = "get:drinks-detail";
    pub const POST_DRINKS: &str = "post:drinks";
    pub const PATCH_DRINKS: &str = "patch:drinks";
    pub const DELETE_DRINKS: &str = "delete:drinks";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error(display = "authorization header is missing or malformed")]
    MissingToken,
    #[error(display = "token signature could not be verified")]
    InvalidSignature,
    #[error(display = "token has expired")]
    ExpiredToken,
    #[error(display = "token claims are malformed")]
    MalformedClaims,
    #[error(display = "permission {:?} not granted", _0)]
    InsufficientPermission(String),
}

/// The verified claims of one caller, for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    pub permissions: Vec<String>,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

#[derive(Clone)]
pub struct PermissionGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl Claims {
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn require(&self, permission: &str) -> Result<(), AuthError> {
        if self.grants(permission) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermission(permission.to_string()))
        }
    }
}

impl PermissionGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        PermissionGate { verifier }
    }

    pub fn authorize(&self, permission: &str, req: &HttpRequest) -> Result<Claims, AuthError> {
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let res = bearer_token(header)
            .and_then(|token| self.verifier.verify(token))
            .and_then(|claims| claims.require(permission).map(|()| claims));

        match &res {
            Ok(claims) => debug!("{} granted to {:?}", permission, claims.sub),
            Err(e) => warn!("{} {} refused: {}", req.method(), req.path(), e),
        }
        res
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PermissionGate").finish()
    }
}

/// Extracts `<token>` from a header of exactly the form `Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MissingToken),
    }
}
