use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    Running,
    /// Stop requested; the in-flight tick finishes, then the loop exits.
    Draining,
    Stopped,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Running => write!(f, "Running"),
            EngineStatus::Draining => write!(f, "Draining"),
            EngineStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub status: EngineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    pub ticks_completed: u64,
    pub orders_placed: u64,
}

/// Lifecycle switch for the tick loop. A stop request drains rather than
/// kills: the current tick's gateway call is allowed to complete.
pub struct EngineController {
    is_running: AtomicBool,
    is_draining: AtomicBool,
    started_at: RwLock<Option<DateTime<Utc>>>,
    ticks_completed: AtomicU64,
    orders_placed: AtomicU64,
    status_tx: broadcast::Sender<EngineStatus>,
}

impl EngineController {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(32);
        Self {
            is_running: AtomicBool::new(false),
            is_draining: AtomicBool::new(false),
            started_at: RwLock::new(None),
            ticks_completed: AtomicU64::new(0),
            orders_placed: AtomicU64::new(0),
            status_tx,
        }
    }

    pub async fn start(&self) -> Result<(), String> {
        if self.is_running.load(Ordering::Acquire) {
            return Err("Engine is already running".to_string());
        }
        self.is_running.store(true, Ordering::Release);
        self.is_draining.store(false, Ordering::Release);
        *self.started_at.write().await = Some(Utc::now());

        info!("Engine started");
        let _ = self.status_tx.send(EngineStatus::Running);
        Ok(())
    }

    pub fn request_stop(&self) -> Result<(), String> {
        if !self.is_running.load(Ordering::Acquire) {
            return Err("Engine is not running".to_string());
        }
        if self.is_draining.swap(true, Ordering::AcqRel) {
            return Err("Engine is already draining".to_string());
        }
        info!("Engine draining");
        let _ = self.status_tx.send(EngineStatus::Draining);
        Ok(())
    }

    /// Called by the tick loop once the in-flight work is done.
    pub fn finish_drain(&self) {
        self.is_running.store(false, Ordering::Release);
        self.is_draining.store(false, Ordering::Release);
        info!("Engine stopped");
        let _ = self.status_tx.send(EngineStatus::Stopped);
    }

    pub fn should_tick(&self) -> bool {
        self.is_running.load(Ordering::Acquire) && !self.is_draining.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> EngineStatus {
        if !self.is_running.load(Ordering::Acquire) {
            EngineStatus::Stopped
        } else if self.is_draining.load(Ordering::Acquire) {
            EngineStatus::Draining
        } else {
            EngineStatus::Running
        }
    }

    pub fn record_tick(&self) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn state(&self) -> EngineState {
        let started_at = *self.started_at.read().await;
        let uptime_seconds = started_at
            .map(|start| (Utc::now() - start).num_seconds().max(0) as u64)
            .unwrap_or(0);
        EngineState {
            status: self.status(),
            started_at,
            uptime_seconds,
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }
}

impl Default for EngineController {
    fn default() -> Self {
        Self::new()
    }
}
