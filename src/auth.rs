use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::backend::{self, Client, Profile, TokenGrant};
use crate::storage::{self, Account, Token};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,24}$").expect("username regex"));

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("enter a valid email address")]
    InvalidEmail,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error("username must be 3-24 letters, digits, or underscores")]
    InvalidUsername,
    #[error("session expired, sign in again")]
    SessionExpired,
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail)
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(AuthError::WeakPassword)
    }
}

pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if USERNAME_RE.is_match(username.trim()) {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername)
    }
}

/// A signed-in identity: the locally stored account plus its live token.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Account,
    pub token: Token,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.account.user_id
    }
}

/// Password auth against the backend's token endpoints. Successful grants
/// are persisted to the local store so sessions survive restarts.
pub struct Flow {
    client: Arc<Client>,
    store: Arc<storage::Store>,
    refresh_skew: Duration,
}

impl Flow {
    pub fn new(client: Arc<Client>, store: Arc<storage::Store>) -> Self {
        Self {
            client,
            store,
            refresh_skew: Duration::from_secs(30),
        }
    }

    pub fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<Session> {
        validate_email(email)?;
        validate_password(password)?;
        validate_username(username)?;

        let email = email.trim();
        let username = username.trim();
        let grant = self.client.sign_up(email, password, username)?;
        self.ensure_profile(&grant, username)?;
        self.persist_grant(grant, email)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        validate_email(email)?;
        let email = email.trim();
        let grant = self.client.sign_in(email, password)?;
        self.persist_grant(grant, email)
    }

    /// Rehydrate a stored session, refreshing the grant when the access
    /// token is at or past its expiry.
    pub fn resume(&self, account: Account, token: Token) -> Result<Session> {
        let skew = chrono::Duration::from_std(self.refresh_skew).unwrap_or_default();
        if token.expires_at - skew > Utc::now() {
            return Ok(Session { account, token });
        }

        let grant = self
            .client
            .refresh_session(&token.refresh_token)
            .context(AuthError::SessionExpired)?;
        self.persist_grant(grant, &account.email)
    }

    pub fn sign_out(&self, account_id: i64) -> Result<()> {
        self.store.delete_token(account_id)
    }

    fn persist_grant(&self, grant: TokenGrant, email: &str) -> Result<Session> {
        let profile = self.fetch_profile(&grant.user.id)?;
        let username = profile
            .as_ref()
            .map(|p| p.username.clone())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());
        let display_name = profile
            .as_ref()
            .and_then(|p| p.display_name.clone())
            .unwrap_or_default();

        let account_id = self.store.upsert_account(Account {
            id: 0,
            user_id: grant.user.id.clone(),
            email: grant.user.email.clone().unwrap_or_else(|| email.to_string()),
            username,
            display_name,
            created_at: Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
            updated_at: Utc::now(),
        })?;

        let expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in.max(60));
        let token = Token {
            account_id,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at,
        };
        self.store.upsert_token(token.clone())?;

        let account = self
            .store
            .get_account_by_id(account_id)?
            .context("auth: account vanished after upsert")?;
        Ok(Session { account, token })
    }

    fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.client
            .maybe_single("profiles", &[("id", backend::eq(user_id))])
    }

    /// Brand-new accounts need a profiles row before anything else can
    /// join against it.
    fn ensure_profile(&self, grant: &TokenGrant, username: &str) -> Result<()> {
        self.client.set_bearer(Some(grant.access_token.clone()));
        if self.fetch_profile(&grant.user.id)?.is_some() {
            return Ok(());
        }
        self.client.insert(
            "profiles",
            &json!({ "id": grant.user.id, "username": username }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("sam@example.com").is_ok());
        assert!(validate_email("  sam@example.com ").is_ok());
        assert!(validate_email("sam@example").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn password_validation() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("sam_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("way_too_long_for_a_username_here").is_err());
    }
}
