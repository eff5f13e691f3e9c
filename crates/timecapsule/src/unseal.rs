//! Capsule seal state and the periodic unseal sweep.
//!
//! Visibility is a pure function of the unlock time. The persisted
//! `unsealed` flag is a cache of that function, flipped once per capsule by
//! [`UnsealSweeper`] through the store's compare-and-set so overlapping
//! sweeps never announce the same capsule twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{CapsuleStore, NotificationScheduler};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::events::{CapsuleEvent, EventBus};
use crate::model::ScheduledNotification;

/// Whether a capsule's contents may be viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SealState {
    /// Locked until the unlock time.
    Sealed,
    /// Open for playback.
    Unsealed,
}

impl SealState {
    /// Check whether the contents are visible.
    #[must_use]
    pub fn is_unsealed(self) -> bool {
        self == Self::Unsealed
    }
}

impl std::fmt::Display for SealState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sealed => write!(f, "sealed"),
            Self::Unsealed => write!(f, "unsealed"),
        }
    }
}

/// Seal state of a capsule unlocking at `unlock_at`, evaluated at `now`.
#[must_use]
pub fn seal_state(unlock_at: DateTime<Utc>, now: DateTime<Utc>) -> SealState {
    if now >= unlock_at {
        SealState::Unsealed
    } else {
        SealState::Sealed
    }
}

/// Time left until a capsule unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    /// Whole days.
    pub days: u64,
    /// Hours past the whole days.
    pub hours: u64,
    /// Minutes past the whole hours.
    pub minutes: u64,
    /// Seconds past the whole minutes.
    pub seconds: u64,
}

impl Countdown {
    /// Remaining time from `now` to `unlock_at`, or `None` once it has passed.
    #[must_use]
    pub fn until(unlock_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Self> {
        let remaining = (unlock_at - now).to_std().ok()?;
        if remaining.is_zero() {
            return None;
        }

        let total = remaining.as_secs();
        Some(Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        })
    }

    /// Countdown text, or `"Unsealed"` once the unlock time has passed.
    #[must_use]
    pub fn label(unlock_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
        Self::until(unlock_at, now).map_or_else(|| "Unsealed".to_string(), |c| c.to_string())
    }
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Cloneable handle used to stop a running sweep loop.
#[derive(Debug, Clone)]
pub struct SweepHandle {
    stop_signal: Arc<watch::Sender<bool>>,
}

impl Default for SweepHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepHandle {
    /// Create a handle in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            stop_signal: Arc::new(tx),
        }
    }

    /// Signal the loop to stop.
    pub fn stop(&self) {
        self.stop_signal.send_replace(true);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        *self.stop_signal.borrow()
    }

    /// Reset the stop signal.
    pub fn reset(&self) {
        self.stop_signal.send_replace(false);
    }

    /// Resolve once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        let mut rx = self.stop_signal.subscribe();
        // The sender lives as long as `self`, so this only returns on stop.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Capsules that were due when the sweep started.
    pub checked: usize,
    /// Capsules this sweep flipped to unsealed.
    pub unsealed: Vec<String>,
    /// Capsules whose flip failed; they are retried on the next sweep.
    pub failed: Vec<String>,
}

/// Flips due capsules to unsealed and announces each flip once.
pub struct UnsealSweeper {
    store: Arc<dyn CapsuleStore>,
    events: EventBus,
    notifier: Option<Arc<dyn NotificationScheduler>>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for UnsealSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsealSweeper")
            .field("interval", &self.interval)
            .field("notify", &self.notifier.is_some())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl UnsealSweeper {
    /// Create a sweeper over `store` that runs every `interval`.
    #[must_use]
    pub fn new(store: Arc<dyn CapsuleStore>, events: EventBus, interval: Duration) -> Self {
        Self {
            store,
            events,
            notifier: None,
            interval,
            clock: Arc::new(SystemClock),
        }
    }

    /// Also deliver an unseal notification for each flipped capsule.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationScheduler>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use `clock` for the loop's notion of now.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one sweep at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the due-capsule query fails. Failures flipping an
    /// individual capsule are logged and reported in [`SweepReport::failed`].
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.store.due_for_unseal(now).await?;
        let mut report = SweepReport {
            checked: due.len(),
            ..SweepReport::default()
        };

        for capsule in due {
            match self.store.mark_unsealed_if_sealed(&capsule.id, now).await {
                Ok(true) => {
                    self.events.publish(CapsuleEvent::CapsuleUnsealed {
                        capsule_id: capsule.id.clone(),
                        unsealed_at: now,
                    });
                    if let Some(notifier) = &self.notifier {
                        let notification = ScheduledNotification::unseal(&capsule, now);
                        if let Err(e) = notifier.schedule(&notification).await {
                            warn!(
                                "Failed to schedule unseal notification for {}: {}",
                                capsule.id, e
                            );
                        }
                    }
                    report.unsealed.push(capsule.id);
                }
                Ok(false) => {
                    debug!("Capsule {} was already unsealed", capsule.id);
                }
                Err(e) => {
                    warn!("Failed to unseal capsule {}: {}", capsule.id, e);
                    report.failed.push(capsule.id);
                }
            }
        }

        Ok(report)
    }

    /// Sweep immediately, then on every interval tick until `handle` stops.
    pub async fn run(&self, handle: SweepHandle) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Unseal sweep running every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = handle.stopped() => break,
            }
            if handle.should_stop() {
                break;
            }

            match self.sweep(self.clock.now()).await {
                Ok(report) if !report.unsealed.is_empty() => {
                    info!("Unsealed {} capsule(s)", report.unsealed.len());
                }
                Ok(report) => {
                    debug!("Sweep checked {} capsule(s)", report.checked);
                }
                Err(e) => warn!("Unseal sweep failed: {}", e),
            }
        }

        info!("Unseal sweep stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{Capsule, NotificationKind};
    use crate::storage::Storage;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn storage_with_capsule(unlock: DateTime<Utc>) -> (Arc<Storage>, Capsule) {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let capsule = Capsule::new("Reunion", "alice", unlock, "123456");
        storage.create_capsule(&capsule).await.unwrap();
        (storage, capsule)
    }

    fn unsealed_events(events: Vec<CapsuleEvent>) -> usize {
        events
            .into_iter()
            .filter(|e| matches!(e, CapsuleEvent::CapsuleUnsealed { .. }))
            .count()
    }

    #[test]
    fn test_seal_state_boundary() {
        let t = at(1_000);
        assert_eq!(seal_state(t, t - ChronoDuration::seconds(1)), SealState::Sealed);
        assert_eq!(seal_state(t, t), SealState::Unsealed);
        assert_eq!(seal_state(t, t + ChronoDuration::seconds(1)), SealState::Unsealed);
        assert!(!SealState::Sealed.is_unsealed());
        assert_eq!(SealState::Unsealed.to_string(), "unsealed");
    }

    #[test]
    fn test_countdown_components() {
        let now = at(0);
        let unlock = now
            + ChronoDuration::days(3)
            + ChronoDuration::hours(4)
            + ChronoDuration::minutes(5)
            + ChronoDuration::seconds(6);

        let c = Countdown::until(unlock, now).unwrap();
        assert_eq!(
            c,
            Countdown {
                days: 3,
                hours: 4,
                minutes: 5,
                seconds: 6
            }
        );
        assert_eq!(c.to_string(), "03d 04h 05m 06s");
    }

    #[test]
    fn test_countdown_after_unlock() {
        let t = at(1_000);
        assert!(Countdown::until(t, t).is_none());
        assert!(Countdown::until(t, t + ChronoDuration::seconds(5)).is_none());
        assert_eq!(Countdown::label(t, t), "Unsealed");
        assert_eq!(
            Countdown::label(t, t - ChronoDuration::seconds(61)),
            "00d 00h 01m 01s"
        );
    }

    #[test]
    fn test_sweep_handle() {
        let handle = SweepHandle::new();
        let other = handle.clone();
        assert!(!handle.should_stop());

        handle.stop();
        assert!(other.should_stop());

        other.reset();
        assert!(!handle.should_stop());
    }

    #[tokio::test]
    async fn test_sweep_before_and_after_unlock() {
        let unlock = at(10_000);
        let (storage, capsule) = storage_with_capsule(unlock).await;
        let events = EventBus::new();
        let mut sub = events.subscribe();
        let sweeper = UnsealSweeper::new(storage.clone(), events, Duration::from_secs(60));

        let report = sweeper.sweep(unlock - ChronoDuration::seconds(1)).await.unwrap();
        assert_eq!(report.checked, 0);
        assert!(!storage.get_capsule(&capsule.id).await.unwrap().unwrap().unsealed);
        assert!(sub.drain().is_empty());

        let report = sweeper.sweep(unlock + ChronoDuration::seconds(1)).await.unwrap();
        assert_eq!(report.unsealed, vec![capsule.id.clone()]);
        assert!(storage.get_capsule(&capsule.id).await.unwrap().unwrap().unsealed);

        let events = sub.drain();
        assert_eq!(
            events,
            vec![CapsuleEvent::CapsuleUnsealed {
                capsule_id: capsule.id.clone(),
                unsealed_at: unlock + ChronoDuration::seconds(1),
            }]
        );
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let unlock = at(10_000);
        let (storage, capsule) = storage_with_capsule(unlock).await;
        let events = EventBus::new();
        let mut sub = events.subscribe();
        let sweeper = UnsealSweeper::new(storage.clone(), events, Duration::from_secs(60));

        sweeper.sweep(unlock).await.unwrap();
        let second = sweeper.sweep(unlock + ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(second, SweepReport::default());

        let loaded = storage.get_capsule(&capsule.id).await.unwrap().unwrap();
        assert!(loaded.unsealed);
        assert_eq!(loaded.unsealed_at, Some(unlock));
        assert_eq!(unsealed_events(sub.drain()), 1);
    }

    #[tokio::test]
    async fn test_overlapping_sweeps_emit_once() {
        let unlock = at(10_000);
        let (storage, _capsule) = storage_with_capsule(unlock).await;
        let events = EventBus::new();
        let mut sub = events.subscribe();

        let a = UnsealSweeper::new(storage.clone(), events.clone(), Duration::from_secs(60));
        let b = UnsealSweeper::new(storage.clone(), events, Duration::from_secs(60));

        let now = unlock + ChronoDuration::seconds(1);
        let (ra, rb) = tokio::join!(a.sweep(now), b.sweep(now));
        let total = ra.unwrap().unsealed.len() + rb.unwrap().unsealed.len();

        assert_eq!(total, 1);
        assert_eq!(unsealed_events(sub.drain()), 1);
    }

    #[tokio::test]
    async fn test_sweep_schedules_unseal_notification() {
        let unlock = at(10_000);
        let (storage, capsule) = storage_with_capsule(unlock).await;
        let sweeper = UnsealSweeper::new(storage.clone(), EventBus::new(), Duration::from_secs(60))
            .with_notifier(storage.clone());

        let now = unlock + ChronoDuration::seconds(30);
        sweeper.sweep(now).await.unwrap();

        let pending = storage.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].capsule_id, capsule.id);
        assert_eq!(pending[0].kind, NotificationKind::Unseal);
        assert_eq!(pending[0].fire_at, now);
    }

    #[tokio::test]
    async fn test_run_sweeps_until_stopped() {
        crate::logging::init_test_logging();
        let unlock = at(10_000);
        let (storage, capsule) = storage_with_capsule(unlock).await;
        let events = EventBus::new();
        let mut sub = events.subscribe();
        let clock = Arc::new(FixedClock::new(unlock - ChronoDuration::seconds(1)));

        let sweeper = Arc::new(
            UnsealSweeper::new(storage.clone(), events, Duration::from_millis(10))
                .with_clock(clock.clone()),
        );
        let handle = SweepHandle::new();
        let task = {
            let sweeper = sweeper.clone();
            let handle = handle.clone();
            tokio::spawn(async move { sweeper.run(handle).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!storage.get_capsule(&capsule.id).await.unwrap().unwrap().unsealed);

        clock.set(unlock);
        let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("no unseal event")
            .unwrap();
        assert_eq!(event.capsule_id(), capsule.id);

        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("sweep loop did not stop")
            .unwrap();
        assert_eq!(unsealed_events(sub.drain()), 0);
    }
}
