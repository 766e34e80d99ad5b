//! Admin directory controller: cached user list with optimistic role changes.
//!
//! ## Phases
//!
//! `Idle → Loading → Ready`, with `Ready → Loading → Ready` on reload and
//! `Ready → Ready` for each role change. Any `Unauthenticated` answer moves
//! the controller to `Unauthenticated`, which is terminal: the stored
//! credential is cleared, a [`SessionEvent::LoginRequired`] is broadcast,
//! and every later call fails the same way without touching the network.
//!
//! ## Ordering
//!
//! Every list load and every role change takes a generation number from a
//! single monotonically increasing counter. A role change records its
//! generation per user id; when its response arrives it is applied only if it
//! is still the current generation for that id. Superseded responses never
//! overwrite a newer optimistic or reconciled value. A successful superseded
//! response still refreshes the server-confirmed role that a later rollback
//! returns to. Once the newest change for an id has failed and rolled back,
//! a success from an older change still in flight is applied: it is the
//! latest value the server accepted.
//!
//! When a list load lands, role changes issued before the load was sent are
//! forgotten (the list is newer server truth). Changes issued after it was
//! sent stay tracked and their optimistic role is laid over the fresh list.
//!
//! The state lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use adminpanel_core::{AdminError, AdminResult, Role, RoleChangeRequest, User, UserId, dedupe_by_id};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::http::{Method, Transport};

pub const USERS_PATH: &str = "/admin/users";

/// Lifecycle phase of a controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No list has been loaded yet.
    Idle,
    /// A list load is in flight.
    Loading,
    /// A list is cached and can be edited.
    Ready,
    /// The backend rejected the session. Terminal.
    Unauthenticated,
}

/// Signals for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Navigate to the login entry point.
    LoginRequired,
}

/// Result of a role change whose request succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChangeOutcome {
    /// The backend's user replaced the cached entry.
    Applied(User),
    /// A newer change or list load took over the entry; the response was not
    /// applied to the visible list.
    Superseded(User),
}

impl RoleChangeOutcome {
    pub fn user(&self) -> &User {
        match self {
            Self::Applied(user) | Self::Superseded(user) => user,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug)]
struct PendingChange {
    generation: u64,
    /// Last role the backend confirmed; rollback target.
    confirmed: Role,
    /// Generation as of which `confirmed` is known.
    confirmed_at: u64,
    /// Role shown optimistically while the request is in flight.
    requested: Role,
}

/// An entry whose newest change failed and was rolled back.
#[derive(Debug, Clone, Copy)]
struct RolledBack {
    /// Generation of the failed change.
    failed: u64,
    /// Newest older response applied since the rollback.
    settled: u64,
}

#[derive(Debug)]
struct DirectoryState {
    phase: Phase,
    users: Vec<User>,
    loaded: bool,
    next_generation: u64,
    latest_load: u64,
    applied_load: u64,
    pending: HashMap<UserId, PendingChange>,
    rolled_back: HashMap<UserId, RolledBack>,
}

impl DirectoryState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            users: Vec::new(),
            loaded: false,
            next_generation: 1,
            latest_load: 0,
            applied_load: 0,
            pending: HashMap::new(),
            rolled_back: HashMap::new(),
        }
    }

    fn bump(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn settled_phase(&self) -> Phase {
        if self.loaded { Phase::Ready } else { Phase::Idle }
    }

    fn entry_mut(&mut self, user_id: UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == user_id)
    }

    /// Install a freshly loaded list issued at `generation`.
    fn apply_list(&mut self, generation: u64, users: Vec<User>) {
        let mut fresh = dedupe_by_id(users);

        self.pending.retain(|_, change| change.generation > generation);
        self.pending
            .retain(|user_id, _| fresh.iter().any(|u| u.id == *user_id));

        for user in &mut fresh {
            if let Some(change) = self.pending.get_mut(&user.id) {
                change.confirmed = user.role.clone();
                change.confirmed_at = generation;
                user.role = change.requested.clone();
            }
        }

        self.rolled_back.clear();
        self.users = fresh;
        self.loaded = true;
        self.applied_load = generation;
    }

    /// Undo the optimistic value of `generation` if it is still current.
    fn rollback(&mut self, user_id: UserId, generation: u64) -> bool {
        let current = self
            .pending
            .get(&user_id)
            .is_some_and(|change| change.generation == generation);
        if !current {
            return false;
        }

        if let Some(change) = self.pending.remove(&user_id) {
            if let Some(entry) = self.entry_mut(user_id) {
                entry.role = change.confirmed;
            }
        }
        self.rolled_back.insert(user_id, RolledBack { failed: generation, settled: 0 });
        true
    }
}

/// Stateful controller behind the admin user table.
///
/// All operations take `&self`; share it behind an `Arc` to run several role
/// changes at once.
pub struct DirectoryController<T> {
    transport: T,
    state: Mutex<DirectoryState>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> DirectoryController<T> {
    pub fn new(transport: T) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            transport,
            state: Mutex::new(DirectoryState::new()),
            events,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Receive redirect signals. Subscribe before issuing calls.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Snapshot of the cached list, in backend order.
    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.lock().users.iter().find(|u| u.id == user_id).cloned()
    }

    /// Whether a role change for `user_id` is awaiting its response.
    pub fn is_pending(&self, user_id: UserId) -> bool {
        self.lock().pending.contains_key(&user_id)
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch `/admin/users` and replace the cached list.
    ///
    /// A transport failure keeps the previous list (or none) and is returned
    /// for display; nothing is retried.
    pub async fn load_users(&self) -> AdminResult<Vec<User>> {
        let generation = {
            let mut state = self.lock();
            if state.phase == Phase::Unauthenticated {
                None
            } else {
                state.phase = Phase::Loading;
                let generation = state.bump();
                state.latest_load = generation;
                Some(generation)
            }
        };
        let Some(generation) = generation else {
            return Err(self.expire_session());
        };

        tracing::debug!(generation, "loading users");
        let result = self
            .transport
            .request(Method::GET, USERS_PATH, None)
            .await
            .and_then(decode_users);

        match result {
            Ok(users) => {
                let mut state = self.lock();
                if state.phase == Phase::Unauthenticated {
                    drop(state);
                    return Err(self.expire_session());
                }

                if generation > state.applied_load {
                    state.apply_list(generation, users);
                    tracing::info!(count = state.users.len(), "user list loaded");
                } else {
                    tracing::warn!(generation, "discarding user list from an older load");
                }
                // A newer load that already failed has left the phase settled.
                if generation == state.latest_load || state.phase != Phase::Loading {
                    state.phase = state.settled_phase();
                }
                Ok(state.users.clone())
            }
            Err(AdminError::Unauthenticated) => Err(self.expire_session()),
            Err(err) => {
                let mut state = self.lock();
                if state.phase != Phase::Unauthenticated && generation == state.latest_load {
                    state.phase = state.settled_phase();
                }
                tracing::warn!(kept = state.users.len(), "user list load failed: {err}");
                Err(err)
            }
        }
    }

    /// Change the role of a cached user.
    ///
    /// The new role is visible in [`users`](Self::users) before the request is
    /// sent. On failure the entry returns to its last confirmed role and the
    /// error is returned.
    pub async fn change_role(&self, user_id: UserId, role: Role) -> AdminResult<RoleChangeOutcome> {
        let request = RoleChangeRequest::new(user_id, role);
        let body = serde_json::to_value(&request)
            .map_err(|e| AdminError::transport(format!("failed to encode role change: {e}")))?;

        let generation = {
            let mut state = self.lock();
            let phase = state.phase;
            match phase {
                Phase::Unauthenticated => None,
                _ if !state.loaded => return Err(AdminError::NotFound(user_id)),
                _ => {
                    let Some(previous) = state.entry_mut(user_id).map(|u| u.role.clone()) else {
                        return Err(AdminError::NotFound(user_id));
                    };

                    let generation = state.bump();
                    let (confirmed, confirmed_at) = match state.pending.get(&user_id) {
                        Some(change) => (change.confirmed.clone(), change.confirmed_at),
                        None => (previous, generation - 1),
                    };
                    state.rolled_back.remove(&user_id);
                    state.pending.insert(
                        user_id,
                        PendingChange {
                            generation,
                            confirmed,
                            confirmed_at,
                            requested: request.role.clone(),
                        },
                    );
                    if let Some(entry) = state.entry_mut(user_id) {
                        entry.role = request.role.clone();
                    }
                    Some(generation)
                }
            }
        };
        let Some(generation) = generation else {
            return Err(self.expire_session());
        };

        tracing::debug!(%user_id, role = %request.role, generation, "changing role");
        let result = self
            .transport
            .request(Method::PUT, &request.path(), Some(body))
            .await
            .and_then(decode_user);

        match result {
            Ok(user) => Ok(self.reconcile(user_id, generation, user)),
            Err(AdminError::Unauthenticated) => {
                self.lock().rollback(user_id, generation);
                Err(self.expire_session())
            }
            Err(err) => {
                if self.lock().rollback(user_id, generation) {
                    tracing::warn!(%user_id, "role change failed, rolled back: {err}");
                } else {
                    tracing::warn!(%user_id, generation, "superseded role change failed: {err}");
                }
                Err(err)
            }
        }
    }

    fn reconcile(&self, user_id: UserId, generation: u64, user: User) -> RoleChangeOutcome {
        let mut state = self.lock();
        if state.phase == Phase::Unauthenticated {
            return RoleChangeOutcome::Superseded(user);
        }

        match state.pending.get(&user_id).map(|change| change.generation) {
            Some(current) if current == generation => {
                state.pending.remove(&user_id);
                if let Some(entry) = state.entry_mut(user_id) {
                    *entry = User { id: user_id, ..user.clone() };
                }
                tracing::info!(%user_id, role = %user.role, "role change applied");
                RoleChangeOutcome::Applied(user)
            }
            Some(_) => {
                // Only a response newer than the known baseline may move it.
                if let Some(change) = state.pending.get_mut(&user_id) {
                    if generation > change.confirmed_at {
                        change.confirmed = user.role.clone();
                        change.confirmed_at = generation;
                    }
                }
                tracing::warn!(%user_id, generation, "discarding superseded role change response");
                RoleChangeOutcome::Superseded(user)
            }
            // Older than a change that already failed: nothing newer is
            // tracked for the entry, so the response is the latest server word.
            None => match state.rolled_back.get(&user_id).copied() {
                Some(marker) if generation < marker.failed && generation > marker.settled => {
                    state
                        .rolled_back
                        .insert(user_id, RolledBack { settled: generation, ..marker });
                    if let Some(entry) = state.entry_mut(user_id) {
                        *entry = User { id: user_id, ..user.clone() };
                    }
                    tracing::info!(%user_id, role = %user.role, "role change applied after newer change failed");
                    RoleChangeOutcome::Applied(user)
                }
                _ => {
                    tracing::warn!(%user_id, generation, "discarding outdated role change response");
                    RoleChangeOutcome::Superseded(user)
                }
            },
        }
    }

    /// Enter the terminal phase, drop the credential and signal the UI.
    fn expire_session(&self) -> AdminError {
        {
            let mut state = self.lock();
            state.phase = Phase::Unauthenticated;
            state.pending.clear();
        }
        self.transport.clear_credential();
        // No receivers is fine: nobody is listening for navigation.
        let _ = self.events.send(SessionEvent::LoginRequired);
        tracing::warn!("session rejected; login required");
        AdminError::Unauthenticated
    }
}

fn decode_users(value: Value) -> AdminResult<Vec<User>> {
    serde_json::from_value(value).map_err(|e| AdminError::transport(format!("undecodable user list: {e}")))
}

fn decode_user(value: Value) -> AdminResult<User> {
    serde_json::from_value(value).map_err(|e| AdminError::transport(format!("undecodable user: {e}")))
}
