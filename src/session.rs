use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use crate::auth::{Flow as AuthFlow, Session as AuthSession};
use crate::backend::Client;
use crate::storage::{self, Account};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("account not found")]
    AccountNotFound,
    #[error("no stored session for account")]
    TokenNotFound,
}

/// Owns every resumed session and the active account, and keeps the
/// backend client's bearer token in sync with whichever is active.
pub struct Manager {
    store: Arc<storage::Store>,
    client: Arc<Client>,
    flow: Arc<AuthFlow>,
    sessions: RwLock<HashMap<i64, AuthSession>>,
    active_id: RwLock<Option<i64>>,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>, client: Arc<Client>, flow: Arc<AuthFlow>) -> Self {
        Self {
            store,
            client,
            flow,
            sessions: RwLock::new(HashMap::new()),
            active_id: RwLock::new(None),
        }
    }

    /// Resume any account with a stored token; the most recently used one
    /// becomes active.
    pub fn load_existing(&self) -> Result<()> {
        let accounts = self.store.list_accounts()?;
        for account in accounts {
            if let Some(token) = self.store.get_token(account.id)? {
                let Ok(session) = self.flow.resume(account.clone(), token) else {
                    continue;
                };
                self.sessions.write().insert(account.id, session);
                if self.active_id.read().is_none() {
                    self.activate(account.id);
                }
            }
        }
        Ok(())
    }

    pub fn active(&self) -> Option<AuthSession> {
        let sessions = self.sessions.read();
        let active = self.active_id.read();
        active.and_then(|id| sessions.get(&id).cloned())
    }

    pub fn active_account_id(&self) -> Option<i64> {
        *self.active_id.read()
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.store.list_accounts()
    }

    pub fn switch(&self, account_id: i64) -> Result<AuthSession> {
        if let Some(session) = self.sessions.read().get(&account_id).cloned() {
            self.activate(account_id);
            return Ok(session);
        }

        let account = self
            .store
            .get_account_by_id(account_id)?
            .ok_or(SessionError::AccountNotFound)?;
        let token = self
            .store
            .get_token(account_id)?
            .ok_or(SessionError::TokenNotFound)?;
        let session = self.flow.resume(account, token)?;
        self.sessions.write().insert(account_id, session.clone());
        self.activate(account_id);
        Ok(session)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let session = self.flow.sign_in(email, password)?;
        self.adopt(session.clone());
        Ok(session)
    }

    pub fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<AuthSession> {
        let session = self.flow.sign_up(email, password, username)?;
        self.adopt(session.clone());
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<()> {
        let Some(account_id) = self.active_account_id() else {
            return Ok(());
        };
        self.flow.sign_out(account_id)?;
        self.sessions.write().remove(&account_id);
        *self.active_id.write() = None;
        self.client.set_bearer(None);
        Ok(())
    }

    fn adopt(&self, session: AuthSession) {
        let id = session.account.id;
        self.sessions.write().insert(id, session);
        self.activate(id);
    }

    fn activate(&self, account_id: i64) {
        *self.active_id.write() = Some(account_id);
        let token = self
            .sessions
            .read()
            .get(&account_id)
            .map(|session| session.token.access_token.clone());
        self.client.set_bearer(token);
    }
}
