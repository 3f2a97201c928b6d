//! Scheduled blanking of sent menu messages.
//!
//! Every pending truncation is persisted with its due time before a timer is
//! armed, so a restart loses nothing: `recover()` re-arms what is left and the
//! periodic sweep catches anything whose timer never fired.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Days, FixedOffset, TimeZone, Utc};
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    calendar::Clock,
    domain::MessageRef,
    messaging::MessagingPort,
    votes::{LedgerStore, PendingTruncation},
    Result,
};

pub const PLACEHOLDER: &str = "Viesti poistettiin";

/// When a sent message is blanked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Fixed delay after sending.
    After(Duration),
    /// The next local midnight after sending.
    AtMidnight,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        TruncationPolicy::After(Duration::from_secs(6 * 60 * 60))
    }
}

impl TruncationPolicy {
    pub fn due_at(&self, now: DateTime<FixedOffset>) -> DateTime<Utc> {
        match self {
            TruncationPolicy::After(d) => {
                let delay = chrono::Duration::from_std(*d).unwrap_or(chrono::Duration::zero());
                (now + delay).with_timezone(&Utc)
            }
            TruncationPolicy::AtMidnight => {
                let tomorrow = now
                    .date_naive()
                    .checked_add_days(Days::new(1))
                    .unwrap_or(now.date_naive());
                tomorrow
                    .and_hms_opt(0, 0, 0)
                    .and_then(|midnight| now.offset().from_local_datetime(&midnight).single())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| now.with_timezone(&Utc))
            }
        }
    }

    /// Footer line telling readers when the message goes away.
    pub fn retention_note(&self) -> String {
        match self {
            TruncationPolicy::After(d) => {
                let minutes = d.as_secs() / 60;
                if minutes >= 60 && minutes % 60 == 0 {
                    format!(
                        "Tämä viesti poistetaan automaattisesti {} tunnin kuluttua",
                        minutes / 60
                    )
                } else {
                    format!("Tämä viesti poistetaan automaattisesti {minutes} minuutin kuluttua")
                }
            }
            TruncationPolicy::AtMidnight => {
                "Tämä viesti poistetaan automaattisesti keskiyöllä".to_string()
            }
        }
    }
}

struct TimerEntry {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TimerEntry {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

#[derive(Default)]
struct SchedulerState {
    timers: HashMap<MessageRef, TimerEntry>,
    sweeper: Option<TimerEntry>,
}

struct SchedulerInner {
    instance_id: String,
    store: Arc<dyn LedgerStore>,
    messenger: Arc<dyn MessagingPort>,
    clock: Arc<dyn Clock>,
    policy: TruncationPolicy,
    sweep_interval: Duration,
    state: Mutex<SchedulerState>,
}

#[derive(Clone)]
pub struct TruncationScheduler {
    inner: Arc<SchedulerInner>,
}

impl TruncationScheduler {
    pub fn new(
        instance_id: impl Into<String>,
        store: Arc<dyn LedgerStore>,
        messenger: Arc<dyn MessagingPort>,
        clock: Arc<dyn Clock>,
        policy: TruncationPolicy,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                instance_id: instance_id.into(),
                store,
                messenger,
                clock,
                policy,
                sweep_interval,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn policy(&self) -> TruncationPolicy {
        self.inner.policy
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.clock.now().with_timezone(&Utc)
    }

    /// Persist a pending truncation for `msg` and arm its timer.
    pub async fn schedule(&self, msg: MessageRef) -> Result<DateTime<Utc>> {
        let due_at = self.inner.policy.due_at(self.inner.clock.now());
        self.inner
            .store
            .add_pending_truncation(PendingTruncation {
                instance_id: self.inner.instance_id.clone(),
                message: msg,
                due_at,
            })
            .await?;
        self.arm(msg, due_at).await;
        debug!("Truncation of {msg} scheduled for {due_at}");
        Ok(due_at)
    }

    /// Forget `msg` without touching it (it was deleted independently).
    pub async fn cancel(&self, msg: MessageRef) -> Result<bool> {
        if let Some(timer) = self.inner.state.lock().await.timers.remove(&msg) {
            timer.stop();
        }
        self.inner.store.remove_pending_truncation(msg).await
    }

    /// Re-arm every pending truncation of this instance. Overdue ones are
    /// truncated right away. Returns how many records were found.
    pub async fn recover(&self) -> Result<usize> {
        let pending = self
            .inner
            .store
            .list_pending_truncations(&self.inner.instance_id)
            .await?;
        let now = self.now_utc();
        for p in &pending {
            if p.due_at <= now {
                // A failed record stays pending for the sweep.
                if let Err(e) = self.truncate(p.message).await {
                    warn!("Recovering truncation of {} failed: {e}", p.message);
                }
            } else {
                self.arm(p.message, p.due_at).await;
            }
        }
        if !pending.is_empty() {
            info!("Recovered {} pending truncation(s)", pending.len());
        }
        Ok(pending.len())
    }

    /// Truncate everything overdue, timers or not. Returns how many messages
    /// were handled.
    pub async fn sweep(&self) -> Result<usize> {
        let pending = self
            .inner
            .store
            .list_pending_truncations(&self.inner.instance_id)
            .await?;
        let now = self.now_utc();
        let mut done = 0usize;
        for p in pending.into_iter().filter(|p| p.due_at <= now) {
            match self.truncate(p.message).await {
                Ok(true) => done += 1,
                Ok(false) => {}
                Err(e) => warn!("Truncation of {} failed: {e}", p.message),
            }
        }
        if done > 0 {
            info!("Sweep truncated {done} message(s)");
        }
        Ok(done)
    }

    /// Blank `msg` and drop its pending record. A message that no longer
    /// exists counts as done; any other failure keeps the record for the next
    /// sweep and returns `Ok(false)`.
    pub async fn truncate(&self, msg: MessageRef) -> Result<bool> {
        match self.inner.messenger.blank_message(msg, PLACEHOLDER).await {
            Ok(()) => debug!("Truncated {msg}"),
            Err(e) if e.is_message_not_found() => {
                info!("Message {msg} already gone, dropping its truncation");
            }
            Err(e) => {
                warn!("Failed to truncate {msg}: {e}");
                return Ok(false);
            }
        }

        self.inner.store.mark_truncated(msg, self.now_utc()).await?;
        // May be running inside this message's own timer task, so only signal it.
        if let Some(timer) = self.inner.state.lock().await.timers.remove(&msg) {
            timer.cancel.cancel();
        }
        Ok(true)
    }

    /// Start the periodic sweep, if it is not already running.
    pub async fn start_sweeper(&self) {
        let mut st = self.inner.state.lock().await;
        if st.sweeper.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        let scheduler = self.clone();
        let interval = self.inner.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tok.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = scheduler.sweep().await {
                            error!("Truncation sweep failed: {e}");
                        }
                    }
                }
            }
        });
        st.sweeper = Some(TimerEntry { cancel, handle });
        info!("Truncation sweeper started (every {:?})", interval);
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(sweeper) = st.sweeper.take() {
            sweeper.stop();
        }
        for (_, timer) in st.timers.drain() {
            timer.stop();
        }
    }

    pub async fn armed(&self) -> usize {
        self.inner.state.lock().await.timers.len()
    }

    async fn arm(&self, msg: MessageRef, due_at: DateTime<Utc>) {
        let wait = (due_at - self.now_utc()).to_std().unwrap_or(Duration::ZERO);
        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        let scheduler = self.clone();

        // Hold the lock across the spawn so the entry exists before the task can finish.
        let mut st = self.inner.state.lock().await;
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tok.cancelled() => {}
                _ = sleep(wait) => {
                    if let Err(e) = scheduler.truncate(msg).await {
                        error!("Truncation of {msg} failed: {e}");
                    }
                }
            }
        });
        if let Some(old) = st.timers.insert(msg, TimerEntry { cancel, handle }) {
            old.stop();
        }
    }
}
