// Cooperative shutdown for the background loops.
//
// `main` owns the `watch::Sender<bool>` and flips it to `true` on Ctrl+C.
// Loops check between cycles; work already in flight runs to completion.

use std::time::Duration;

use tokio::sync::watch;

pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub fn requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration` unless shutdown arrives first. Returns `true` when the
/// caller should stop. A dropped sender counts as shutdown.
pub async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if requested(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => requested(shutdown),
        changed = shutdown.changed() => changed.is_err() || requested(shutdown),
    }
}
