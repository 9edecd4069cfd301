//! The auth provider boundary: accounts, the signed-in principal, and
//! reauthentication for sensitive operations.
//!
//! Passwords are stored as salted blake3 hashes. Token/session internals are
//! deliberately out of scope; "signed in" is simply the current principal
//! slot, observable through a watch channel.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use palaver_shared::UserId;

use crate::error::AuthError;

/// The authenticated identity handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: UserId,
    pub email: String,
    /// Mutable display name; one of the username sources the identity
    /// resolver reconciles.
    pub display_name: Option<String>,
}

/// Proof of a recent credential check. Consumed by password change and
/// account deletion; a stale or missing proof fails with
/// [`AuthError::ReauthRequired`].
#[derive(Debug)]
pub struct Reauth {
    uid: UserId,
    nonce: u64,
}

struct Account {
    uid: UserId,
    email: String,
    display_name: Option<String>,
    salt: [u8; 16],
    password_hash: [u8; 32],
}

impl Account {
    fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }
}

struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<Principal>,
    reauth_nonce: u64,
}

/// In-memory auth provider. One instance per client.
pub struct AuthService {
    state: Mutex<AuthState>,
    changes: watch::Sender<Option<Principal>>,
}

fn hash_password(salt: &[u8; 16], password: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}

impl AuthService {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            state: Mutex::new(AuthState {
                accounts: HashMap::new(),
                current: None,
                reauth_nonce: 0,
            }),
            changes,
        }
    }

    /// Create an account and sign it in.
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        let email = normalize_email(email)?;
        let mut state = self.state.lock().expect("auth lock poisoned");
        if state.accounts.contains_key(&email) {
            return Err(AuthError::EmailInUse);
        }

        let uid = UserId::new(Uuid::new_v4().to_string())
            .map_err(|e| AuthError::InvalidAccount(e.to_string()))?;
        let salt: [u8; 16] = rand::random();
        let account = Account {
            uid: uid.clone(),
            email: email.clone(),
            display_name: None,
            salt,
            password_hash: hash_password(&salt, password),
        };
        state.accounts.insert(email.clone(), account);

        let principal = Principal {
            uid,
            email,
            display_name: None,
        };
        state.current = Some(principal.clone());
        drop(state);
        self.changes.send_replace(Some(principal.clone()));
        info!(uid = %principal.uid, "account created");
        Ok(principal)
    }

    /// Sign in with an email/password pair.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let email = normalize_email(email)?;
        let mut state = self.state.lock().expect("auth lock poisoned");
        let account = state
            .accounts
            .get(&email)
            .filter(|a| a.verify(password))
            .ok_or(AuthError::InvalidCredential)?;

        let principal = Principal {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
        };
        state.current = Some(principal.clone());
        drop(state);
        self.changes.send_replace(Some(principal.clone()));
        debug!(uid = %principal.uid, "signed in");
        Ok(principal)
    }

    /// Clear the current principal. Idempotent.
    pub async fn sign_out(&self) {
        let mut state = self.state.lock().expect("auth lock poisoned");
        if state.current.take().is_some() {
            state.reauth_nonce += 1; // invalidate outstanding proofs
            drop(state);
            self.changes.send_replace(None);
            debug!("signed out");
        }
    }

    /// The currently signed-in principal, if any.
    pub fn current(&self) -> Option<Principal> {
        self.state.lock().expect("auth lock poisoned").current.clone()
    }

    /// Observe principal changes (sign-in, sign-out, display-name updates).
    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.changes.subscribe()
    }

    /// Update the display name of the account `uid`, which must be the
    /// current principal: a stale caller cannot rename whoever is signed in
    /// now.
    pub async fn update_display_name(&self, uid: &UserId, name: &str) -> Result<(), AuthError> {
        let mut state = self.state.lock().expect("auth lock poisoned");
        let email = state
            .current
            .as_ref()
            .filter(|p| &p.uid == uid)
            .map(|p| p.email.clone())
            .ok_or(AuthError::NotSignedIn)?;

        if let Some(account) = state.accounts.get_mut(&email) {
            account.display_name = Some(name.to_string());
        }
        let principal = state.current.as_mut().expect("checked above");
        principal.display_name = Some(name.to_string());
        let updated = principal.clone();
        drop(state);
        self.changes.send_replace(Some(updated));
        Ok(())
    }

    /// Re-verify the password of the account `uid` and mint a fresh proof.
    /// `uid` must be the current principal.
    ///
    /// A wrong password fails with [`AuthError::InvalidCredential`], never a
    /// generic error, so callers can re-prompt.
    pub async fn reauthenticate(&self, uid: &UserId, password: &str) -> Result<Reauth, AuthError> {
        let mut state = self.state.lock().expect("auth lock poisoned");
        let (uid, email) = state
            .current
            .as_ref()
            .filter(|p| &p.uid == uid)
            .map(|p| (p.uid.clone(), p.email.clone()))
            .ok_or(AuthError::NotSignedIn)?;

        let account = state.accounts.get(&email).ok_or(AuthError::NotSignedIn)?;
        if !account.verify(password) {
            return Err(AuthError::InvalidCredential);
        }

        state.reauth_nonce += 1;
        Ok(Reauth {
            uid,
            nonce: state.reauth_nonce,
        })
    }

    /// Change the signed-in account's password. Requires a fresh [`Reauth`].
    pub async fn change_password(&self, proof: Reauth, new_password: &str) -> Result<(), AuthError> {
        let mut state = self.state.lock().expect("auth lock poisoned");
        self.check_proof(&state, &proof)?;

        let email = state
            .current
            .as_ref()
            .map(|p| p.email.clone())
            .expect("proof implies a principal");
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or(AuthError::NotSignedIn)?;
        account.salt = rand::random();
        account.password_hash = hash_password(&account.salt, new_password);
        state.reauth_nonce += 1; // proof is single-use
        info!("password changed");
        Ok(())
    }

    /// Delete the signed-in account and sign out. Requires a fresh
    /// [`Reauth`].
    pub async fn delete_account(&self, proof: Reauth) -> Result<(), AuthError> {
        let mut state = self.state.lock().expect("auth lock poisoned");
        self.check_proof(&state, &proof)?;

        let email = state
            .current
            .as_ref()
            .map(|p| p.email.clone())
            .expect("proof implies a principal");
        state.accounts.remove(&email);
        state.current = None;
        state.reauth_nonce += 1;
        drop(state);
        self.changes.send_replace(None);
        info!("account deleted");
        Ok(())
    }

    fn check_proof(&self, state: &AuthState, proof: &Reauth) -> Result<(), AuthError> {
        let current = state.current.as_ref().ok_or(AuthError::NotSignedIn)?;
        if current.uid != proof.uid || proof.nonce != state.reauth_nonce {
            return Err(AuthError::ReauthRequired);
        }
        Ok(())
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").finish_non_exhaustive()
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidAccount(format!(
            "not an email address: {email:?}"
        )));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_sign_in() {
        let auth = AuthService::new();
        let p1 = auth.create_account("amy@example.com", "hunter22").await.unwrap();
        auth.sign_out().await;
        assert!(auth.current().is_none());

        let p2 = auth.sign_in("amy@example.com", "hunter22").await.unwrap();
        assert_eq!(p1.uid, p2.uid);
        assert!(matches!(
            auth.sign_in("amy@example.com", "wrong").await,
            Err(AuthError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let auth = AuthService::new();
        auth.create_account("amy@example.com", "hunter22").await.unwrap();
        assert!(matches!(
            auth.create_account("Amy@Example.com", "other-pass").await,
            Err(AuthError::EmailInUse)
        ));
    }

    #[tokio::test]
    async fn display_name_survives_sign_in() {
        let auth = AuthService::new();
        let amy = auth.create_account("amy@example.com", "hunter22").await.unwrap();
        auth.update_display_name(&amy.uid, "amy").await.unwrap();
        auth.sign_out().await;

        let p = auth.sign_in("amy@example.com", "hunter22").await.unwrap();
        assert_eq!(p.display_name.as_deref(), Some("amy"));
    }

    #[tokio::test]
    async fn account_mutations_reject_a_stale_principal() {
        let auth = AuthService::new();
        let amy = auth.create_account("amy@example.com", "hunter22").await.unwrap();
        let bob = auth.create_account("bob@example.com", "hunter22").await.unwrap();

        // Bob is the current principal; Amy's uid must not touch his account.
        assert!(matches!(
            auth.update_display_name(&amy.uid, "mallory").await,
            Err(AuthError::NotSignedIn)
        ));
        assert!(matches!(
            auth.reauthenticate(&amy.uid, "hunter22").await,
            Err(AuthError::NotSignedIn)
        ));

        auth.update_display_name(&bob.uid, "bob").await.unwrap();
        let p = auth.sign_in("bob@example.com", "hunter22").await.unwrap();
        assert_eq!(p.display_name.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn change_password_needs_fresh_proof() {
        let auth = AuthService::new();
        let amy = auth.create_account("amy@example.com", "hunter22").await.unwrap();

        let proof = auth.reauthenticate(&amy.uid, "hunter22").await.unwrap();
        auth.change_password(proof, "correct-horse").await.unwrap();

        // Old password no longer valid, new one is.
        assert!(matches!(
            auth.reauthenticate(&amy.uid, "hunter22").await,
            Err(AuthError::InvalidCredential)
        ));
        let proof = auth.reauthenticate(&amy.uid, "correct-horse").await.unwrap();

        // A proof is single-use: minting a second one invalidates the first.
        let newer = auth.reauthenticate(&amy.uid, "correct-horse").await.unwrap();
        assert!(matches!(
            auth.change_password(proof, "x").await,
            Err(AuthError::ReauthRequired)
        ));
        auth.change_password(newer, "y-z-w-v-u").await.unwrap();
    }

    #[tokio::test]
    async fn delete_account_signs_out() {
        let auth = AuthService::new();
        let amy = auth.create_account("amy@example.com", "hunter22").await.unwrap();
        let proof = auth.reauthenticate(&amy.uid, "hunter22").await.unwrap();
        auth.delete_account(proof).await.unwrap();

        assert!(auth.current().is_none());
        assert!(matches!(
            auth.sign_in("amy@example.com", "hunter22").await,
            Err(AuthError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn subscribe_observes_changes() {
        let auth = AuthService::new();
        let mut rx = auth.subscribe();
        assert!(rx.borrow().is_none());

        auth.create_account("amy@example.com", "hunter22").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());

        auth.sign_out().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
