//! JWT access/refresh issuance with rotation-on-refresh.
//!
//! A refresh token is only redeemable while its device record exists in the
//! cache under `(account id, jti)`. Refreshing deletes that record before a new
//! pair is minted, and only the caller whose delete removed it gets the pair,
//! so each refresh token can be redeemed once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::AuthError;
use super::credentials::CredentialVerifier;
use super::signer::TokenSigner;
use crate::cache::{Cache, CacheExt, advisory, keys};
use crate::models::auth::{AccountSnapshot, DeviceRecord, TokenClaims, TokenPair};
use crate::uuid::new_jti;

pub struct JwtIssuer {
    signer: Arc<dyn TokenSigner>,
    cache: Arc<dyn Cache>,
    verifier: CredentialVerifier,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtIssuer {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        cache: Arc<dyn Cache>,
        verifier: CredentialVerifier,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            cache,
            verifier,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Verify credentials and issue a new token pair.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<TokenPair, AuthError> {
        let account = self.verifier.verify(email, password).await?;
        let snapshot = AccountSnapshot::from(&account);
        let now = Utc::now();
        let jti = new_jti();

        let access = TokenClaims::new(&snapshot, now, self.access_ttl, None);
        let refresh = TokenClaims::new(&snapshot, now, self.refresh_ttl, Some(jti.clone()));
        let pair = self.sign_pair(&access, &refresh)?;

        self.store_device(&refresh, jti, ip, user_agent, now).await?;
        info!(account_id = %account.id, "token pair issued");
        Ok(pair)
    }

    /// Redeem a refresh token for a new pair. The redeemed token stops working.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let (claims, jti) = self.parse_refresh(refresh_token)?;
        let key = keys::refresh_token(claims.sub, &jti);

        let device: Option<DeviceRecord> = self.cache.get_into(&key).await?;
        let Some(device) = device else {
            debug!(account_id = %claims.sub, "refresh token not recognised");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.cache.del(&key).await? {
            debug!(account_id = %claims.sub, "refresh token already redeemed");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let new_jti = new_jti();
        let access = claims.reissue(now, self.access_ttl, None);
        let refresh = claims.reissue(now, self.refresh_ttl, Some(new_jti.clone()));
        let pair = self.sign_pair(&access, &refresh)?;

        self.store_device(&refresh, new_jti, &device.ip, &device.user_agent, now)
            .await?;
        info!(account_id = %claims.sub, "refresh token rotated");
        Ok(pair)
    }

    /// Revoke a refresh token. The cache delete is advisory.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        let (claims, jti) = self.parse_refresh(refresh_token)?;
        let key = keys::refresh_token(claims.sub, &jti);
        advisory("cache.del", &key, self.cache.del(&key).await);
        info!(account_id = %claims.sub, "refresh token revoked");
        Ok(())
    }

    /// Claims of a valid access token. Refresh tokens are not accepted here.
    pub fn authenticate(&self, access_token: &str) -> Result<TokenClaims, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let claims = self.signer.parse(access_token)?;
        if claims.jti.is_some() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(claims)
    }

    fn parse_refresh(&self, token: &str) -> Result<(TokenClaims, String), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let claims = self.signer.parse(token)?;
        match claims.jti.clone() {
            Some(jti) if !jti.is_empty() => Ok((claims, jti)),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    fn sign_pair(
        &self,
        access: &TokenClaims,
        refresh: &TokenClaims,
    ) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.signer.sign_access_token(access)?,
            refresh_token: self.signer.sign_refresh_token(refresh)?,
            expires_in: access.exp - access.iat,
        })
    }

    async fn store_device(
        &self,
        refresh: &TokenClaims,
        jti: String,
        ip: &str,
        user_agent: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let key = keys::refresh_token(refresh.sub, &jti);
        let record = DeviceRecord {
            jti,
            account_id: refresh.sub,
            user_agent: user_agent.to_string(),
            ip: ip.to_string(),
            issued_at,
            expires_at: refresh.expires_at().unwrap_or(issued_at),
        };
        self.cache.set_json(&key, &record, self.refresh_ttl).await?;
        Ok(())
    }
}
