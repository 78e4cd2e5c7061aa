//! Periodic removal of finished or abandoned games.

use std::time::SystemTime;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::{services::session_service::apply_effects, state::SharedState};

/// Sweep on the configured interval until the application shuts down.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing is stale at startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

/// Expire idle in-memory sessions, then delete old games from storage.
///
/// Returns how many in-memory sessions were removed.
pub async fn sweep_once(state: &SharedState) -> usize {
    let policy = state.config().expiry_policy();
    let mut removed = 0;

    for handle in state.sessions().handles() {
        let mut session = handle.session().lock().await;
        let Some(fx) = session.expire(Instant::now(), &policy) else {
            continue;
        };
        info!(code = handle.code(), phase = session.phase().as_str(), "expiring idle session");
        removed += usize::from(fx.teardown);
        apply_effects(state, &handle, &mut session, fx);
    }

    if let Some(store) = state.game_store().await {
        let cutoff = SystemTime::now()
            .checked_sub(state.config().stored_game_retention())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match store.delete_stale_games(cutoff).await {
            Ok(0) => {}
            Ok(count) => info!(count, "deleted stale games from storage"),
            Err(err) => warn!(error = %err, "failed to delete stale games"),
        }
    }

    removed
}
