use crate::geo::{BoundingBox, Viewport};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Turns a high-frequency stream of viewport changes into debounced
/// bounding-box publications.
///
/// Every change restarts a quiet-period timer; when it expires the bbox of
/// the *current* viewport is published. The timer is armed on `start`, so
/// subscribers get a first bbox without any user interaction. Identical
/// consecutive boxes are all published.
#[derive(Debug)]
pub struct ViewportWatcher {
    debounce: Duration,
    publisher: broadcast::Sender<BoundingBox>,
    task: Option<JoinHandle<()>>,
}

impl ViewportWatcher {
    pub fn new(debounce: Duration) -> Self {
        let (publisher, _) = broadcast::channel(16);
        Self {
            debounce,
            publisher,
            task: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoundingBox> {
        self.publisher.subscribe()
    }

    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Starts watching `viewports`. A running watch is replaced.
    pub fn start(&mut self, viewports: watch::Receiver<Viewport>) {
        if let Some(previous) = self.task.take() {
            previous.abort();
        }
        let publisher = self.publisher.clone();
        self.task = Some(tokio::spawn(debounce_loop(
            viewports,
            publisher,
            self.debounce,
        )));
    }

    /// Cancels the pending timer and drops the viewport subscription.
    /// Nothing is published once this returns.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Either cancelled or already finished; both are fine here.
            let _ = task.await;
            debug!("viewport watcher stopped");
        }
    }
}

impl Drop for ViewportWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn sleep_until_armed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn debounce_loop(
    mut viewports: watch::Receiver<Viewport>,
    publisher: broadcast::Sender<BoundingBox>,
    debounce: Duration,
) {
    let mut deadline = Some(Instant::now() + debounce);
    let mut source_open = true;

    loop {
        tokio::select! {
            changed = viewports.changed(), if source_open => {
                if changed.is_ok() {
                    trace!("viewport changed, restarting quiet period");
                    deadline = Some(Instant::now() + debounce);
                } else {
                    debug!("viewport source closed");
                    source_open = false;
                }
            }
            () = sleep_until_armed(deadline) => {
                deadline = None;
                let bbox = BoundingBox::from_viewport(&viewports.borrow_and_update());
                debug!(%bbox, "publishing bbox");
                if publisher.send(bbox).is_err() {
                    trace!("no bbox subscribers");
                }
            }
        }

        if !source_open && deadline.is_none() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{advance, sleep};

    fn view(lon: f64) -> Viewport {
        Viewport::new(LatLng::new(10.0, lon), LatLng::new(11.0, lon + 1.0))
    }

    fn bbox(lon: f64) -> BoundingBox {
        BoundingBox::from_viewport(&view(lon))
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_once_on_start_without_interaction() {
        let (_map, viewports) = watch::channel(view(0.0));
        let mut watcher = ViewportWatcher::new(DEFAULT_DEBOUNCE);
        let mut rx = watcher.subscribe();
        watcher.start(viewports);

        sleep(Duration::from_millis(260)).await;
        assert_eq!(rx.try_recv(), Ok(bbox(0.0)));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        watcher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_collapses_to_last_viewport() {
        let (map, viewports) = watch::channel(view(0.0));
        let mut watcher = ViewportWatcher::new(DEFAULT_DEBOUNCE);
        let mut rx = watcher.subscribe();
        watcher.start(viewports);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(rx.try_recv(), Ok(bbox(0.0)));

        for step in 1..=8 {
            map.send_replace(view(f64::from(step)));
            sleep(Duration::from_millis(30)).await;
        }
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        sleep(Duration::from_millis(250)).await;
        assert_eq!(rx.try_recv(), Ok(bbox(8.0)));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        watcher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn identical_views_are_published_again() {
        let (map, viewports) = watch::channel(view(3.0));
        let mut watcher = ViewportWatcher::new(DEFAULT_DEBOUNCE);
        let mut rx = watcher.subscribe();
        watcher.start(viewports);
        sleep(Duration::from_millis(300)).await;

        map.send_replace(view(3.0));
        sleep(Duration::from_millis(300)).await;

        assert_eq!(rx.try_recv(), Ok(bbox(3.0)));
        assert_eq!(rx.try_recv(), Ok(bbox(3.0)));
        watcher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_pending_timer() {
        let (map, viewports) = watch::channel(view(0.0));
        let mut watcher = ViewportWatcher::new(DEFAULT_DEBOUNCE);
        let mut rx = watcher.subscribe();
        watcher.start(viewports);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(rx.try_recv(), Ok(bbox(0.0)));

        map.send_replace(view(5.0));
        sleep(Duration::from_millis(100)).await;
        watcher.stop().await;
        assert!(!watcher.is_running());

        advance(Duration::from_secs(2)).await;
        map.send_replace(view(6.0));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_source_still_flushes_pending_change() {
        let (map, viewports) = watch::channel(view(0.0));
        let mut watcher = ViewportWatcher::new(DEFAULT_DEBOUNCE);
        let mut rx = watcher.subscribe();
        watcher.start(viewports);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(rx.try_recv(), Ok(bbox(0.0)));

        map.send_replace(view(2.0));
        sleep(Duration::from_millis(10)).await;
        drop(map);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(rx.try_recv(), Ok(bbox(2.0)));
        watcher.stop().await;
    }
}
