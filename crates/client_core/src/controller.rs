//! Screen-level lifecycle for the election list.
//!
//! One [`ElectionListController`] lives per mounted screen. It owns the list
//! snapshot, the unlock gate and the progress tickers of visible rows.
//! Reads are tagged with a generation token; only the most recently started
//! read may be applied.

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use shared::{
    domain::{Election, ElectionId},
    error::{Notice, NoticeCode},
    protocol::{
        decode_elections, ElectionRow, ListPhase, NavigationIntent, ScreenView, ELECTIONS_KEY,
        START_DATE_FORMAT, START_TIME_FORMAT,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    auth::AuthSession,
    clock::Clock,
    error::ListError,
    progress::{progress_of, ProgressClock, ProgressConfig, ProgressState, ProgressSubscription},
    store::KeyValueStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Applied { count: usize },
    /// The gate is locked; the read will happen after a successful unlock.
    Deferred,
    /// The initial load already ran or is running.
    Skipped,
    /// A newer read started before this one resolved.
    Superseded,
    /// The screen was deactivated before the read resolved.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    Rejected,
    AlreadyUnlocked,
    /// Another verification is still pending; the secret was not re-submitted.
    InProgress,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListState {
    /// `None` until the first successful read; distinct from an empty list.
    pub entities: Option<Vec<Election>>,
    pub refreshing: bool,
    pub gate_open: bool,
    pub phase: ListPhase,
}

impl ListState {
    pub fn loaded(&self) -> bool {
        self.entities.is_some()
    }

    pub fn count(&self) -> usize {
        self.entities.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone)]
pub enum ScreenEvent {
    StateChanged(ListState),
    /// One tick of a visible row. `show_progress` and `near_end` carry the
    /// same display policy as [`ElectionRow`].
    Progress {
        election_id: ElectionId,
        progress: ProgressState,
        show_progress: bool,
        near_end: bool,
    },
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitialLoad {
    NotStarted,
    InFlight,
    Done,
}

struct RowTicker {
    window: (i64, i64),
    subscription: ProgressSubscription,
}

struct ControllerState {
    entities: Option<Vec<Election>>,
    refreshing: bool,
    gate_open: bool,
    active: bool,
    initial_load: InitialLoad,
    generation: u64,
    latest_inflight: bool,
    unlock_pending: bool,
    tickers: HashMap<ElectionId, RowTicker>,
}

impl ControllerState {
    fn begin_read(&mut self) -> u64 {
        self.generation += 1;
        self.latest_inflight = true;
        self.generation
    }

    fn phase(&self) -> ListPhase {
        if self.latest_inflight {
            ListPhase::Loading
        } else if self.entities.is_some() {
            ListPhase::Ready
        } else {
            ListPhase::Unloaded
        }
    }

    fn snapshot(&self) -> ListState {
        ListState {
            entities: self.entities.clone(),
            refreshing: self.refreshing,
            gate_open: self.gate_open,
            phase: self.phase(),
        }
    }
}

pub struct ElectionListController {
    store: Arc<dyn KeyValueStore>,
    auth: Arc<dyn AuthSession>,
    clock: Arc<dyn Clock>,
    config: ProgressConfig,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ScreenEvent>,
}

impl ElectionListController {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        auth: Arc<dyn AuthSession>,
        clock: Arc<dyn Clock>,
        config: ProgressConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            auth,
            clock,
            config,
            inner: Mutex::new(ControllerState {
                entities: None,
                refreshing: false,
                gate_open: false,
                active: true,
                initial_load: InitialLoad::NotStarted,
                generation: 0,
                latest_inflight: false,
                unlock_pending: false,
                tickers: HashMap::new(),
            }),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ScreenEvent> {
        self.events.subscribe()
    }

    /// First activation. Reads immediately when the session was already
    /// unlocked, otherwise defers until [`Self::unlock`] succeeds.
    pub async fn load_initial(&self) -> Result<ReadOutcome, ListError> {
        let session_unlocked = self.auth.is_unlocked().await;
        let token = {
            let mut state = self.inner.lock().await;
            if !state.active {
                return Ok(ReadOutcome::Discarded);
            }
            if session_unlocked && !state.gate_open {
                state.gate_open = true;
                debug!("elections: gate opened by prior session");
            }
            if !state.gate_open {
                debug!("elections: initial load deferred until unlock");
                return Ok(ReadOutcome::Deferred);
            }
            if state.initial_load != InitialLoad::NotStarted {
                return Ok(ReadOutcome::Skipped);
            }
            state.initial_load = InitialLoad::InFlight;
            let token = state.begin_read();
            self.emit_state(&state);
            token
        };

        self.read_and_apply(token, "initial").await
    }

    /// User-initiated reload. `refreshing` is cleared when the newest read
    /// resolves, whether it succeeded or not.
    pub async fn refresh(&self) -> Result<ReadOutcome, ListError> {
        let session_unlocked = self.auth.is_unlocked().await;
        let token = {
            let mut state = self.inner.lock().await;
            if !state.active {
                return Ok(ReadOutcome::Discarded);
            }
            if session_unlocked {
                state.gate_open = true;
            }
            if !state.gate_open {
                self.emit(ScreenEvent::Notice(Notice::new(
                    NoticeCode::Locked,
                    "unlock the screen to refresh elections",
                )));
                return Ok(ReadOutcome::Deferred);
            }
            if state.initial_load == InitialLoad::NotStarted {
                state.initial_load = InitialLoad::InFlight;
            }
            state.refreshing = true;
            let token = state.begin_read();
            self.emit_state(&state);
            token
        };

        self.read_and_apply(token, "refresh").await
    }

    /// Hands `secret` to the session collaborator. On success the gate opens
    /// and the deferred initial load runs exactly once.
    pub async fn unlock(&self, secret: &str) -> Result<UnlockOutcome, ListError> {
        {
            let mut state = self.inner.lock().await;
            if !state.active {
                return Ok(UnlockOutcome::Inactive);
            }
            if state.gate_open {
                return Ok(UnlockOutcome::AlreadyUnlocked);
            }
            if state.unlock_pending {
                debug!("elections: unlock already pending");
                return Ok(UnlockOutcome::InProgress);
            }
            state.unlock_pending = true;
        }

        let verdict = self.auth.unlock(secret).await;

        let needs_load = {
            let mut state = self.inner.lock().await;
            state.unlock_pending = false;
            if !state.active {
                return Ok(UnlockOutcome::Inactive);
            }
            match verdict {
                Ok(true) => {
                    state.gate_open = true;
                    info!("elections: gate unlocked");
                    self.emit_state(&state);
                    state.initial_load == InitialLoad::NotStarted
                }
                Ok(false) => {
                    self.emit(ScreenEvent::Notice(Notice::new(
                        NoticeCode::UnlockFailure,
                        "incorrect pin",
                    )));
                    return Ok(UnlockOutcome::Rejected);
                }
                Err(err) => {
                    let err = ListError::Unlock(format!("{err:#}"));
                    warn!("elections: {err}");
                    self.emit(ScreenEvent::Notice(err.notice()));
                    return Err(err);
                }
            }
        };

        if needs_load {
            // A failed load is already reported as a notice; the unlock
            // itself still succeeded.
            if let Err(err) = self.load_initial().await {
                debug!("elections: post-unlock load failed: {err}");
            }
        }
        Ok(UnlockOutcome::Unlocked)
    }

    /// Maps a click on a row to a details intent carrying the row's current
    /// snapshot.
    pub async fn select(&self, election_id: ElectionId) -> Option<NavigationIntent> {
        let state = self.inner.lock().await;
        if !state.active {
            return None;
        }
        if !state.gate_open {
            self.emit(ScreenEvent::Notice(Notice::new(
                NoticeCode::Locked,
                "unlock the screen to open an election",
            )));
            return None;
        }
        state
            .entities
            .as_ref()?
            .iter()
            .find(|election| election.id == election_id)
            .map(|election| NavigationIntent::ElectionDetails {
                election: election.clone(),
            })
    }

    /// Only reachable with a signed-in user.
    pub async fn create(&self) -> Option<NavigationIntent> {
        if !self.inner.lock().await.active {
            return None;
        }
        self.auth
            .current_user()
            .await
            .map(|_| NavigationIntent::CreateElection)
    }

    pub async fn snapshot(&self) -> ListState {
        self.inner.lock().await.snapshot()
    }

    /// Render payload for the whole screen, with progress sampled now.
    pub async fn view(&self) -> ScreenView {
        let can_create = self.auth.current_user().await.is_some();
        let state = self.inner.lock().await;
        let now_ms = self.clock.now_ms();
        let rows: Vec<ElectionRow> = if state.gate_open {
            state
                .entities
                .iter()
                .flatten()
                .map(|election| self.row(election, now_ms))
                .collect()
        } else {
            Vec::new()
        };

        ScreenView {
            phase: state.phase(),
            count: rows.len(),
            rows,
            loaded: state.entities.is_some(),
            refreshing: state.refreshing,
            gate_open: state.gate_open,
            can_create,
        }
    }

    /// Row tickers still delivering samples. A ticker that stopped after its
    /// window ended is still tracked but no longer counted.
    pub async fn active_progress_clocks(&self) -> usize {
        self.inner
            .lock()
            .await
            .tickers
            .values()
            .filter(|ticker| ticker.subscription.is_active())
            .count()
    }

    /// Screen unmounted: cancels every ticker and turns any later resolution
    /// into a no-op.
    pub async fn deactivate(&self) {
        let mut state = self.inner.lock().await;
        if !state.active {
            return;
        }
        state.active = false;
        let cancelled = state.tickers.len();
        state.tickers.clear();
        info!("elections: screen deactivated tickers_cancelled={cancelled}");
    }

    async fn read_and_apply(
        &self,
        token: u64,
        kind: &'static str,
    ) -> Result<ReadOutcome, ListError> {
        debug!("elections: read started kind={kind} generation={token}");
        let result = match self.store.get_item(ELECTIONS_KEY).await {
            Ok(raw) => decode_elections(raw.as_deref())
                .map_err(|err| ListError::Decode(err.to_string())),
            Err(err) => Err(ListError::StoreRead(format!("{err:#}"))),
        };

        let mut state = self.inner.lock().await;
        if !state.active {
            debug!("elections: read resolved after teardown kind={kind} generation={token}");
            return Ok(ReadOutcome::Discarded);
        }
        if token != state.generation {
            debug!(
                "elections: read superseded kind={kind} generation={token} latest={}",
                state.generation
            );
            return Ok(ReadOutcome::Superseded);
        }

        state.latest_inflight = false;
        state.refreshing = false;
        match result {
            Ok(elections) => {
                let count = elections.len();
                let malformed = elections.iter().filter(|e| e.is_malformed()).count();
                if malformed > 0 {
                    warn!("elections: {malformed} election(s) with malformed windows");
                    self.emit(ScreenEvent::Notice(Notice::new(
                        NoticeCode::MalformedEntity,
                        format!("{malformed} election(s) have an end date before their start date"),
                    )));
                }
                self.reconcile_tickers(&mut state, &elections);
                state.entities = Some(elections);
                state.initial_load = InitialLoad::Done;
                info!("elections: applied kind={kind} generation={token} count={count}");
                self.emit_state(&state);
                Ok(ReadOutcome::Applied { count })
            }
            Err(err) => {
                if state.initial_load == InitialLoad::InFlight {
                    state.initial_load = InitialLoad::NotStarted;
                }
                warn!("elections: read failed kind={kind} generation={token}: {err}");
                self.emit(ScreenEvent::Notice(err.notice()));
                self.emit_state(&state);
                Err(err)
            }
        }
    }

    fn reconcile_tickers(&self, state: &mut ControllerState, elections: &[Election]) {
        let wanted: HashMap<ElectionId, (i64, i64)> = elections
            .iter()
            .filter(|election| !election.is_malformed())
            .map(|election| (election.id, (election.start_date, election.end_date)))
            .collect();

        state
            .tickers
            .retain(|id, ticker| wanted.get(id) == Some(&ticker.window));

        for election in elections {
            if state.tickers.contains_key(&election.id) {
                continue;
            }
            let Some(clock) =
                ProgressClock::for_election(Arc::clone(&self.clock), election, self.config.clone())
            else {
                continue;
            };
            let election_id = election.id;
            let events = self.events.clone();
            let threshold = self.config.near_end_threshold;
            let subscription = clock.start(move |progress| {
                let _ = events.send(ScreenEvent::Progress {
                    election_id,
                    progress,
                    show_progress: progress.is_visible(),
                    near_end: progress.is_near_end(threshold),
                });
            });
            state.tickers.insert(
                election_id,
                RowTicker {
                    window: (election.start_date, election.end_date),
                    subscription,
                },
            );
        }
        debug!("elections: progress tickers active={}", state.tickers.len());
    }

    fn row(&self, election: &Election, now_ms: i64) -> ElectionRow {
        let progress = progress_of(election, now_ms);
        let starts_at = election.starts_at();
        ElectionRow {
            id: election.id,
            title: election.title.clone(),
            description: election.description.clone(),
            start_date: election.start_date,
            end_date: election.end_date,
            start_date_label: starts_at.map(|at| at.format(START_DATE_FORMAT).to_string()),
            start_time_label: starts_at.map(|at| at.format(START_TIME_FORMAT).to_string()),
            progress_ratio: progress.map(|p| p.ratio),
            show_progress: progress.is_some_and(|p| p.is_visible()),
            near_end: progress.is_some_and(|p| p.is_near_end(self.config.near_end_threshold)),
        }
    }

    fn emit_state(&self, state: &ControllerState) {
        self.emit(ScreenEvent::StateChanged(state.snapshot()));
    }

    fn emit(&self, event: ScreenEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
