//! Frame scheduler
//!
//! One shared per-frame tick, distributed to every registered animator. The
//! loop is started once and runs for the lifetime of the scheduler.

use crate::utils::token::Token;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Per-frame callback, invoked with the frame timestamp in milliseconds
pub type FrameCallback = Arc<dyn Fn(f64) + Send + Sync>;

struct Subscription {
    token: Token,
    callback: FrameCallback,
    active: bool,
}

pub struct FrameScheduler {
    subscriptions: Mutex<Vec<Subscription>>,
    origin: Instant,
    frame_count: AtomicU64,
}

impl FrameScheduler {
    /// Create a scheduler that is ticked manually
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(Vec::new()),
            origin: Instant::now(),
            frame_count: AtomicU64::new(0),
        })
    }

    /// Create a scheduler and spawn its frame loop on the current tokio runtime
    pub fn start(frame_interval: Duration) -> Arc<Self> {
        let scheduler = Self::new();
        let weak = Arc::downgrade(&scheduler);
        tokio::spawn(Self::run_loop(weak, frame_interval));
        tracing::info!("Frame loop started ({:?} per frame)", frame_interval);
        scheduler
    }

    async fn run_loop(scheduler: Weak<Self>, frame_interval: Duration) {
        let mut interval = tokio::time::interval(frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(scheduler) = scheduler.upgrade() else {
                break;
            };
            scheduler.tick(scheduler.origin.elapsed().as_secs_f64() * 1000.0);
        }
        tracing::debug!("Frame loop ended");
    }

    /// Register a callback for every frame
    pub fn subscribe<F>(&self, callback: F) -> Token
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let mut subscriptions = self.subscriptions.lock();
        let token = Token::generate(|t| subscriptions.iter().any(|s| &s.token == t));
        subscriptions.push(Subscription {
            token: token.clone(),
            callback: Arc::new(callback),
            active: true,
        });
        token
    }

    /// Permanently remove a subscription
    pub fn unsubscribe(&self, token: &Token) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| &s.token != token);
        subscriptions.len() != before
    }

    /// Stop delivering frames to a subscription without removing it
    pub fn pause_execution(&self, token: &Token) -> bool {
        self.set_active(token, false)
    }

    /// Resume delivery to a paused subscription
    pub fn resume_execution(&self, token: &Token) -> bool {
        self.set_active(token, true)
    }

    fn set_active(&self, token: &Token, active: bool) -> bool {
        match self.subscriptions.lock().iter_mut().find(|s| &s.token == token) {
            Some(subscription) => {
                subscription.active = active;
                true
            }
            None => {
                tracing::debug!("No frame subscription for token {}", token);
                false
            }
        }
    }

    /// Whether the subscription exists and is receiving frames
    pub fn is_active(&self, token: &Token) -> Option<bool> {
        self.subscriptions
            .lock()
            .iter()
            .find(|s| &s.token == token)
            .map(|s| s.active)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Run one frame.
    ///
    /// Iterates over the tokens present when the tick began, looking each up
    /// again before invoking it, so callbacks may subscribe, unsubscribe or
    /// pause (themselves included) while the tick runs.
    pub fn tick(&self, timestamp_ms: f64) {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        let tokens: Vec<Token> = self
            .subscriptions
            .lock()
            .iter()
            .map(|s| s.token.clone())
            .collect();

        for token in tokens {
            let callback = {
                let subscriptions = self.subscriptions.lock();
                subscriptions
                    .iter()
                    .find(|s| s.token == token && s.active)
                    .map(|s| s.callback.clone())
            };
            if let Some(callback) = callback {
                callback(timestamp_ms);
            }
        }
    }
}
