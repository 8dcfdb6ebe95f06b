//! Background interval tasks
//!
//! Each sweeper runs a cleanup closure every `interval` until the shared
//! cancellation token fires.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Sweepers {
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Sweepers {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Run `sweep` every `every`; the first run happens one interval after start
    pub fn spawn<F, Fut>(&mut self, name: &'static str, every: Duration, sweep: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send + 'static,
    {
        let token = self.token.child_token();
        let every = every.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = sweep().await;
                        if removed > 0 {
                            debug!("{} sweep removed {} entries", name, removed);
                        }
                    }
                }
            }
            debug!("{} sweeper stopped", name);
        });

        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every sweeper and wait for them to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                info!("{} sweeper ended abnormally: {}", name, e);
            }
        }
    }
}

impl Default for Sweepers {
    fn default() -> Self {
        Self::new()
    }
}
