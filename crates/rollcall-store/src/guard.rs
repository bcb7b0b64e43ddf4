//! [`SessionGuard`] — decides whether a protected view may be shown.
//!
//! Mounting runs a synchronous check against the locally cached session,
//! then (for a signed-in member) starts a poll task that revalidates the
//! account against the backend on a fixed interval. The task is owned by the
//! returned [`GuardHandle`]; dropping or unmounting the handle stops it and
//! any result that lands afterwards is ignored.
//!
//! A revalidation that cannot reach the server changes nothing: only an
//! explicit "account gone" or "inactive" answer denies access.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::{Local, NaiveDate};
use rollcall_core::{
  gateway::Gateway,
  normalize::normalize_user,
  storage::{CURRENT_USER_KEY, SESSION_KEY, SessionStorage, load_user, save_user},
  user::User,
};
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

/// How often a mounted guard revalidates the session.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The calendar day used for subscription checks.
pub fn today() -> NaiveDate { Local::now().date_naive() }

// ─── Types ───────────────────────────────────────────────────────────────────

/// Who may see a guarded view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
  /// Everyone is allowed, including inactive users. Login, registration
  /// and the inactive notice itself are public.
  Public,
  /// An active signed-in session is required.
  Member,
  /// The current user must be an administrator. Subscription is not checked.
  Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
  /// No cached session.
  NoSession,
  /// Signed in, but not as an administrator.
  NotAdmin,
  /// The subscription is inactive or has lapsed.
  Inactive,
  /// The backend no longer knows the account.
  AccountNotFound,
}

impl DenyReason {
  /// Where the view layer should send the user.
  pub fn redirect(&self) -> &'static str {
    match self {
      Self::NoSession | Self::AccountNotFound => "/login",
      Self::NotAdmin => "/admin/login",
      Self::Inactive => "/inactive",
    }
  }
}

/// What a mounted guard currently decides. The initial cache check runs
/// inside [`SessionGuard::mount`] without suspending, so a handle always
/// starts at a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
  Allowed,
  Denied(DenyReason),
}

impl GuardState {
  pub fn is_allowed(&self) -> bool { matches!(self, Self::Allowed) }
}

// ─── Guard ───────────────────────────────────────────────────────────────────

pub struct SessionGuard<G, S> {
  gateway:  Arc<G>,
  storage:  Arc<S>,
  policy:   RoutePolicy,
  interval: Duration,
}

impl<G, S> SessionGuard<G, S>
where
  G: Gateway + 'static,
  S: SessionStorage + 'static,
{
  pub fn new(gateway: Arc<G>, storage: Arc<S>, policy: RoutePolicy) -> Self {
    Self { gateway, storage, policy, interval: DEFAULT_POLL_INTERVAL }
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn policy(&self) -> RoutePolicy { self.policy }

  /// The synchronous, cache-only verdict. Never touches the network.
  pub fn check_cached(&self) -> GuardState { self.cached_verdict().0 }

  /// The verdict plus the session user to revalidate, if polling applies.
  fn cached_verdict(&self) -> (GuardState, Option<User>) {
    match self.policy {
      RoutePolicy::Admin => match load_user(self.storage.as_ref(), CURRENT_USER_KEY) {
        Some(user) if user.is_admin => (GuardState::Allowed, None),
        _ => (GuardState::Denied(DenyReason::NotAdmin), None),
      },
      RoutePolicy::Public => (GuardState::Allowed, None),
      RoutePolicy::Member => match load_user(self.storage.as_ref(), SESSION_KEY) {
        None => (GuardState::Denied(DenyReason::NoSession), None),
        Some(user) if user.is_active_on(today()) => (GuardState::Allowed, Some(user)),
        Some(_) => (GuardState::Denied(DenyReason::Inactive), None),
      },
    }
  }

  /// Mount the guard: decide from cache immediately, then keep revalidating
  /// in the background until denied or unmounted. Must be called from within
  /// a tokio runtime.
  pub fn mount(&self) -> GuardHandle {
    let (verdict, session) = self.cached_verdict();
    debug!(policy = ?self.policy, ?verdict, "guard mounted");
    let (tx, rx) = watch::channel(verdict);

    let cancelled = Arc::new(AtomicBool::new(false));
    let task = session.filter(|_| verdict.is_allowed()).map(|_| {
      tokio::spawn(poll(
        self.gateway.clone(),
        self.storage.clone(),
        self.interval,
        tx,
        cancelled.clone(),
      ))
    });

    GuardHandle { state: rx, cancelled, task }
  }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Owns a mounted guard's poll task. Dropping it unmounts the guard.
pub struct GuardHandle {
  state:     watch::Receiver<GuardState>,
  cancelled: Arc<AtomicBool>,
  task:      Option<JoinHandle<()>>,
}

impl GuardHandle {
  pub fn state(&self) -> GuardState { *self.state.borrow() }

  pub fn subscribe(&self) -> watch::Receiver<GuardState> { self.state.clone() }

  /// Whether the background revalidation is still scheduled.
  pub fn is_polling(&self) -> bool {
    self.task.as_ref().is_some_and(|task| !task.is_finished())
  }

  /// Stop polling now. Any revalidation still in flight is discarded.
  pub fn unmount(mut self) { self.stop(); }

  fn stop(&mut self) {
    self.cancelled.store(true, Ordering::SeqCst);
    if let Some(task) = self.task.take() {
      task.abort();
      debug!("guard unmounted");
    }
  }
}

impl Drop for GuardHandle {
  fn drop(&mut self) { self.stop(); }
}

// ─── Poll task ───────────────────────────────────────────────────────────────

enum Revalidation {
  /// The backend returned the account.
  Fresh(User),
  /// The backend says the account does not exist.
  Gone,
  /// Could not confirm either way.
  Unconfirmed,
}

async fn poll<G, S>(
  gateway: Arc<G>,
  storage: Arc<S>,
  every: Duration,
  tx: watch::Sender<GuardState>,
  cancelled: Arc<AtomicBool>,
) where
  G: Gateway,
  S: SessionStorage,
{
  let mut ticker = interval(every);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    // The first tick completes immediately.
    ticker.tick().await;
    if cancelled.load(Ordering::SeqCst) {
      return;
    }

    let Some(local) = load_user(storage.as_ref(), SESSION_KEY) else {
      info!("session cleared while mounted");
      tx.send_replace(GuardState::Denied(DenyReason::NoSession));
      return;
    };

    let outcome = revalidate(gateway.as_ref(), &local.id).await;
    if cancelled.load(Ordering::SeqCst) {
      debug!("ignoring revalidation that finished after unmount");
      return;
    }

    match apply(storage.as_ref(), outcome, today()) {
      Some(GuardState::Denied(reason)) => {
        info!(user = %local.id, ?reason, "session denied");
        tx.send_replace(GuardState::Denied(reason));
        return;
      }
      Some(state) => {
        tx.send_if_modified(|current| {
          let changed = *current != state;
          *current = state;
          changed
        });
      }
      None => {}
    }
  }
}

async fn revalidate<G: Gateway>(gateway: &G, user_id: &str) -> Revalidation {
  match gateway.get_user(user_id.to_string()).await {
    Ok(Some(raw)) => match normalize_user(&raw) {
      Some(user) => Revalidation::Fresh(user),
      None => Revalidation::Unconfirmed,
    },
    Ok(None) => Revalidation::Gone,
    Err(e) => {
      debug!(user = user_id, error = %e, "could not revalidate session; assuming still valid");
      Revalidation::Unconfirmed
    }
  }
}

/// Apply a revalidation to the cache and return the state it implies, if
/// any.
fn apply<S: SessionStorage + ?Sized>(
  storage: &S,
  outcome: Revalidation,
  today: NaiveDate,
) -> Option<GuardState> {
  match outcome {
    Revalidation::Fresh(user) => {
      if let Err(e) = save_user(storage, SESSION_KEY, &user) {
        warn!(error = %e, "failed to cache revalidated session");
      }
      Some(if user.is_active_on(today) {
        GuardState::Allowed
      } else {
        GuardState::Denied(DenyReason::Inactive)
      })
    }
    Revalidation::Gone => {
      if let Err(e) = storage.remove(SESSION_KEY) {
        warn!(error = %e, "failed to clear session cache");
      }
      Some(GuardState::Denied(DenyReason::AccountNotFound))
    }
    Revalidation::Unconfirmed => None,
  }
}
