// SPDX-License-Identifier: MIT

//! Authentication lifecycle state machine.
//!
//! Transitions are serialized behind an internal lock, and every call
//! carries a sequence number so a slow, earlier call can never overwrite
//! the terminal state of a more recently initiated one.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{AuthenticationState, User};
use crate::services::identity::IdentityClient;
use crate::services::subscriptions::SubscriptionCoordinator;
use crate::stores::{vault_keys, CredentialVault};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Drives `AuthenticationState` and owns the side effects of sign-in,
/// registration and sign-out. On success, control passes to the
/// `SubscriptionCoordinator`, which loads and owns the session user.
pub struct AuthSession {
    config: Config,
    identity: Arc<dyn IdentityClient>,
    vault: Arc<dyn CredentialVault>,
    coordinator: Arc<SubscriptionCoordinator>,
    state_tx: watch::Sender<AuthenticationState>,
    error_tx: watch::Sender<Option<String>>,
    /// Serializes sign-in/register/sign-out; a second call queues behind
    /// the in-flight one.
    op_lock: Mutex<()>,
    /// Monotonic call sequence for stale-result suppression: the most
    /// recently initiated call's terminal state wins.
    initiated: AtomicU64,
}

impl AuthSession {
    pub fn new(
        config: Config,
        identity: Arc<dyn IdentityClient>,
        vault: Arc<dyn CredentialVault>,
        coordinator: Arc<SubscriptionCoordinator>,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthenticationState::SignedOut);
        let (error_tx, _) = watch::channel(None);
        Self {
            config,
            identity,
            vault,
            coordinator,
            state_tx,
            error_tx,
            op_lock: Mutex::new(()),
            initiated: AtomicU64::new(0),
        }
    }

    // ─── Published State ─────────────────────────────────────────

    pub fn state(&self) -> AuthenticationState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthenticationState> {
        self.state_tx.subscribe()
    }

    /// The active error for display, set by the most recent failed call.
    pub fn last_error(&self) -> Option<String> {
        self.error_tx.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    fn begin(&self) -> u64 {
        self.initiated.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Commit a terminal state unless a newer call has been initiated
    /// since `seq`; a suppressed result must not override the newer one.
    fn finish(&self, seq: u64, state: AuthenticationState, error: Option<String>) {
        if seq != self.initiated.load(Ordering::SeqCst) {
            tracing::info!(seq, "Stale authentication result suppressed");
            return;
        }
        self.error_tx.send_replace(error);
        self.state_tx.send_replace(state);
    }

    // ─── Operations ──────────────────────────────────────────────

    /// Sign in with the given credentials.
    ///
    /// Transitions to `SigningIn` immediately. On provider success the
    /// session user is loaded and only then are the credentials persisted
    /// to the vault; any failure ends in `SignedOut` with an active error.
    pub async fn sign_in(&self, identity: &str, secret: &str) -> Result<()> {
        let seq = self.begin();
        self.state_tx.send_replace(AuthenticationState::SigningIn);
        let _guard = self.op_lock.lock().await;
        self.error_tx.send_replace(None);

        let uid = match self.identity.authenticate(identity, secret).await {
            Ok(uid) => uid,
            Err(kind) => {
                tracing::info!(%kind, "Sign in rejected by provider");
                self.finish(
                    seq,
                    AuthenticationState::SignedOut,
                    Some(kind.user_message().to_string()),
                );
                return Err(AppError::AuthProvider(kind));
            }
        };

        if let Err(e) = self.coordinator.load_user(&uid).await {
            self.finish(
                seq,
                AuthenticationState::SignedOut,
                Some("loading the user session".to_string()),
            );
            return Err(e);
        }

        // Secret material reaches the vault only after the provider
        // accepted it and the session loaded.
        self.vault.save(vault_keys::IDENTITY, identity);
        self.vault.save(vault_keys::SECRET, secret);

        tracing::info!(uid, "Signed in");
        self.finish(seq, AuthenticationState::SignedIn, None);
        Ok(())
    }

    /// Register a new account and sign it in.
    ///
    /// On provider success a fresh user record is written (placeholder
    /// image, empty event sets) before the session loads. If that write
    /// fails the provider identity is left orphaned — the identity
    /// contract offers no delete — and the failure is surfaced.
    pub async fn register(&self, identity: &str, secret: &str, display_name: &str) -> Result<()> {
        let seq = self.begin();
        self.state_tx.send_replace(AuthenticationState::SigningIn);
        let _guard = self.op_lock.lock().await;
        self.error_tx.send_replace(None);

        let uid = match self.identity.register(identity, secret).await {
            Ok(uid) => uid,
            Err(kind) => {
                tracing::info!(%kind, "Registration rejected by provider");
                self.finish(
                    seq,
                    AuthenticationState::SignedOut,
                    Some(kind.user_message().to_string()),
                );
                return Err(AppError::AuthProvider(kind));
            }
        };

        let user = User::new(
            uid.clone(),
            identity.to_string(),
            display_name.to_string(),
            self.config.default_image_locator.clone(),
        );
        if let Err(e) = self.coordinator.create_user_record(&user).await {
            tracing::warn!(uid, error = %e, "User record write failed; provider identity is orphaned");
            self.finish(
                seq,
                AuthenticationState::SignedOut,
                Some("completing registration".to_string()),
            );
            return Err(e);
        }

        if let Err(e) = self.coordinator.load_user(&uid).await {
            self.finish(
                seq,
                AuthenticationState::SignedOut,
                Some("loading the user session".to_string()),
            );
            return Err(e);
        }

        self.vault.save(vault_keys::IDENTITY, identity);
        self.vault.save(vault_keys::SECRET, secret);

        tracing::info!(uid, "Registered and signed in");
        self.finish(seq, AuthenticationState::SignedIn, None);
        Ok(())
    }

    /// Sign out. On provider failure the session stays `SignedIn` and the
    /// error is surfaced, not swallowed.
    pub async fn sign_out(&self) -> Result<()> {
        let seq = self.begin();
        let _guard = self.op_lock.lock().await;
        self.error_tx.send_replace(None);

        if let Err(kind) = self.identity.sign_out().await {
            self.error_tx
                .send_replace(Some(kind.user_message().to_string()));
            return Err(AppError::AuthProvider(kind));
        }

        self.coordinator.logout();
        tracing::info!("Signed out");
        self.finish(seq, AuthenticationState::SignedOut, None);
        Ok(())
    }

    /// Re-prove identity with the vaulted credentials, as required before
    /// sensitive provider operations. Missing credentials are terminal for
    /// this call; there is no automatic retry.
    pub async fn reauthenticate(&self) -> Result<String> {
        reauthenticate_with(&*self.identity, &*self.vault).await
    }
}

/// Re-authenticate against the provider with the vaulted credentials.
///
/// Shared between `AuthSession::reauthenticate` and the coordinator's
/// profile update, which must re-prove identity before an email change.
pub(crate) async fn reauthenticate_with(
    identity: &dyn IdentityClient,
    vault: &dyn CredentialVault,
) -> Result<String> {
    let id = vault
        .read(vault_keys::IDENTITY)
        .ok_or(AppError::MissingCredentials)?;
    let secret = vault
        .read(vault_keys::SECRET)
        .ok_or(AppError::MissingCredentials)?;
    identity
        .authenticate(&id, &secret)
        .await
        .map_err(AppError::AuthProvider)
}
