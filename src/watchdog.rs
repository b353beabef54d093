//! Liveness watchdog
//!
//! An operational safety net against accidentally deadlocked tasks: a
//! registered task receives a ping message carrying a reply slot on a
//! fixed interval and must answer within a deadline. A miss is logged
//! and, when configured, aborts the process so the supervisor restarts
//! it. Not a correctness requirement; only tasks that are expected to
//! always be responsive (like the registry) register.

use crate::config::WatchdogConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Ping = oneshot::Sender<()>;

enum WatchdogCmd {
    Register { name: String, tx: mpsc::Sender<Ping> },
}

/// The receiving end handed to a monitored task. The task must answer
/// every ping promptly from its main loop.
pub struct Heartbeat {
    rx: mpsc::Receiver<Ping>,
}

impl Heartbeat {
    /// Receive the next ping. Answer it with [`Heartbeat::ack`].
    pub async fn recv(&mut self) -> Option<Ping> {
        self.rx.recv().await
    }

    /// A heartbeat that never receives pings, for tasks running without
    /// a watchdog
    pub fn disabled() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self { rx }
    }

    pub fn ack(ping: Ping) {
        let _ = ping.send(());
    }
}

/// Handle to the watchdog task
#[derive(Clone)]
pub struct WatchdogHandle {
    tx: mpsc::Sender<WatchdogCmd>,
}

impl WatchdogHandle {
    pub fn spawn(config: WatchdogConfig) -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(run(config, rx));
        Self { tx }
    }

    /// Register a task under `name` and get its heartbeat receiver
    pub async fn register(&self, name: &str) -> Heartbeat {
        let (ping_tx, ping_rx) = mpsc::channel(1);
        let _ = self
            .tx
            .send(WatchdogCmd::Register {
                name: name.to_string(),
                tx: ping_tx,
            })
            .await;
        Heartbeat { rx: ping_rx }
    }
}

async fn run(config: WatchdogConfig, mut rx: mpsc::Receiver<WatchdogCmd>) {
    let mut registrants: Vec<(String, mpsc::Sender<Ping>)> = Vec::new();
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(WatchdogCmd::Register { name, tx }) => {
                    debug!(task = %name, "Watchdog registration");
                    registrants.push((name, tx));
                }
                None => return,
            },
            _ = ticker.tick() => {
                let mut gone = Vec::new();
                for (idx, (name, tx)) in registrants.iter().enumerate() {
                    let (reply_tx, reply_rx) = oneshot::channel();
                    if tx.try_send(reply_tx).is_err() {
                        if tx.is_closed() {
                            gone.push(idx);
                            continue;
                        }
                        // Previous ping still unread: the task is stuck.
                        miss(name, &config);
                        continue;
                    }
                    if tokio::time::timeout(config.deadline(), reply_rx).await.is_err() {
                        miss(name, &config);
                    }
                }
                for idx in gone.into_iter().rev() {
                    registrants.swap_remove(idx);
                }
            }
        }
    }
}

fn miss(name: &str, config: &WatchdogConfig) {
    error!(task = name, "Task failed to answer watchdog ping");
    if config.abort_on_miss {
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> WatchdogConfig {
        WatchdogConfig {
            enabled: true,
            interval_secs: 1,
            deadline_secs: 1,
            abort_on_miss: false,
        }
    }

    #[tokio::test]
    async fn test_responsive_task_keeps_answering() {
        let watchdog = WatchdogHandle::spawn(fast_config());
        let mut heartbeat = watchdog.register("responsive").await;

        // Answer a couple of pings; the watchdog keeps pinging as long
        // as we do.
        for _ in 0..2 {
            let ping = tokio::time::timeout(Duration::from_secs(3), heartbeat.recv())
                .await
                .expect("ping within interval")
                .expect("watchdog alive");
            Heartbeat::ack(ping);
        }
    }

    #[tokio::test]
    async fn test_disabled_heartbeat_never_pings() {
        let mut heartbeat = Heartbeat::disabled();
        assert!(heartbeat.recv().await.is_none());
    }
}
