// Access-token verification against the identity provider's JWKS

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{Result, ServiceError};

/// Signature algorithms the issuer is allowed to use. Symmetric algorithms
/// are excluded: a leaked verification key must never mint tokens.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Verified access-token claims. `tenant_id` stays optional here; the edge
/// decides how its absence is surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

#[derive(Debug, Clone)]
pub struct JwksConfig {
    pub jwks_url: String,
    pub issuer: String,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            jwks_url: "http://localhost:8090/.well-known/jwks.json".to_string(),
            issuer: "http://localhost:8090".to_string(),
            refresh_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

/// Verifies bearer tokens against a cached, periodically refreshed JWKS.
///
/// Readers always see a complete key set: refreshes build the new set off
/// to the side and swap it in atomically. Only one refresh runs at a time;
/// a kid miss triggers at most one forced refresh per verification.
pub struct JwksVerifier {
    config: JwksConfig,
    http: reqwest::Client,
    keys: RwLock<Option<Arc<CachedKeys>>>,
    refresh_lock: Mutex<()>,
}

impl JwksVerifier {
    pub fn new(config: JwksConfig) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(format!("http client: {}", e)))?;
        Ok(Arc::new(Self {
            config,
            http,
            keys: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }))
    }

    pub async fn verify(&self, token: &str) -> Result<AccessClaims> {
        if token.split('.').count() != 3 {
            return Err(ServiceError::MalformedToken);
        }

        let header = decode_header(token).map_err(|_| ServiceError::MalformedToken)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(ServiceError::InvalidSignature);
        }

        let key = match self.find_key(header.kid.as_deref(), header.alg).await? {
            Some(key) => key,
            None => {
                // First miss forces a refresh: the issuer may have rotated.
                self.refresh(Duration::ZERO).await?;
                self.find_key(header.kid.as_deref(), header.alg)
                    .await?
                    .ok_or(ServiceError::InvalidSignature)?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Audience is not part of this deployment's token contract.
        validation.validate_aud = false;

        let data = decode::<AccessClaims>(token, &key, &validation).map_err(map_jwt_error)?;

        // jsonwebtoken checks exp; iat-in-the-future is on us.
        let now = chrono::Utc::now().timestamp();
        if data.claims.iat > now + 60 {
            return Err(ServiceError::MalformedToken);
        }

        Ok(data.claims)
    }

    async fn find_key(&self, kid: Option<&str>, alg: Algorithm) -> Result<Option<DecodingKey>> {
        let cached = {
            let guard = self.keys.read().await;
            guard.clone()
        };

        let cached = match cached {
            Some(cached) if cached.fetched_at.elapsed() < self.config.refresh_interval => cached,
            _ => {
                self.refresh(self.config.refresh_interval).await?;
                let guard = self.keys.read().await;
                match guard.clone() {
                    Some(cached) => cached,
                    None => return Ok(None),
                }
            }
        };

        let jwk = match kid {
            Some(kid) => cached.set.find(kid),
            // Issuers publishing a single unnamed key omit the kid.
            None => cached.set.keys.iter().find(|k| key_matches_alg(k, alg)),
        };

        match jwk {
            Some(jwk) => DecodingKey::from_jwk(jwk)
                .map(Some)
                .map_err(|_| ServiceError::InvalidSignature),
            None => Ok(None),
        }
    }

    /// Fetches the key set, at most one request in flight. `min_age` skips
    /// the fetch when the cache is younger than that: interval-driven
    /// callers pass the refresh interval so concurrent waiters coalesce;
    /// a kid miss passes zero to force a real fetch.
    async fn refresh(&self, min_age: Duration) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while this one waited.
        {
            let guard = self.keys.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < min_age {
                    return Ok(());
                }
            }
        }

        debug!(url = %self.config.jwks_url, "Refreshing JWKS");
        let response = self
            .http
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("jwks fetch: {}", e)))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "JWKS endpoint returned an error");
            return Err(ServiceError::UpstreamUnavailable(format!(
                "jwks fetch: status {}",
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(format!("jwks parse: {}", e)))?;

        info!(keys = set.keys.len(), "JWKS refreshed");
        let mut guard = self.keys.write().await;
        *guard = Some(Arc::new(CachedKeys {
            set,
            fetched_at: Instant::now(),
        }));
        Ok(())
    }
}

fn key_matches_alg(jwk: &Jwk, alg: Algorithm) -> bool {
    match (&jwk.algorithm, alg) {
        (AlgorithmParameters::RSA(_), Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) => {
            true
        }
        (AlgorithmParameters::EllipticCurve(_), Algorithm::ES256 | Algorithm::ES384) => true,
        _ => false,
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> ServiceError {
    match e.kind() {
        ErrorKind::ExpiredSignature => ServiceError::ExpiredToken,
        ErrorKind::InvalidIssuer => ServiceError::InvalidIssuer,
        ErrorKind::MissingRequiredClaim(claim) => ServiceError::MissingRequiredClaim(claim.clone()),
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => ServiceError::InvalidSignature,
        ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::InvalidToken => {
            ServiceError::MalformedToken
        }
        _ => ServiceError::InvalidSignature,
    }
}
