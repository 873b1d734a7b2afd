//! Stream changes with Consul blocking queries.
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;

use authproxy_store::Version;
use authproxy_store::WatchEvent;
use authproxy_store::WatchStream;

use crate::client::ConsulClient;
use crate::protocol::Snapshot;

/// Progress of a Consul watch stream.
struct WatchState {
    client: ConsulClient,
    events: VecDeque<WatchEvent>,

    /// Consul index of the last snapshot, `None` until the first snapshot is fetched.
    index: Option<u64>,
    prefix: String,
    since: Option<Version>,
    snapshot: Snapshot,
    wait: Duration,
}

/// Lazily watch all keys under `prefix`.
///
/// The first poll fetches the current state of the prefix.
/// Without a `since` version this initial state produces no events,
/// otherwise keys modified after `since` are reported as changed.
/// The stream ends after the first error.
pub(crate) fn watch(
    client: ConsulClient,
    wait: Duration,
    prefix: String,
    since: Option<Version>,
) -> WatchStream {
    let state = WatchState {
        client,
        events: VecDeque::new(),
        index: None,
        prefix,
        since,
        snapshot: Snapshot::new(),
        wait,
    };
    Box::pin(futures::stream::try_unfold(state, next_event))
}

async fn next_event(mut state: WatchState) -> Result<Option<(WatchEvent, WatchState)>> {
    loop {
        if let Some(event) = state.events.pop_front() {
            return Ok(Some((event, state)));
        }

        let block = state.index.map(|index| (index, state.wait));
        let (records, index) = state.client.fetch_prefix(&state.prefix, block).await?;
        let current = crate::protocol::snapshot(records);

        match state.index {
            None => {
                if let Some(since) = state.since {
                    let mut changed = current.clone();
                    changed.retain(|_, (_, version)| *version > since);
                    let version = Version::from(index);
                    let changes = crate::protocol::diff(&Snapshot::new(), &changed, version);
                    state.events.extend(changes);
                }
            }
            Some(_) => {
                let version = Version::from(index);
                let changes = crate::protocol::diff(&state.snapshot, &current, version);
                state.events.extend(changes);
            }
        }

        // Consul indexes can go backwards (for example after a snapshot restore): start over.
        state.index = match state.index {
            Some(previous) if index < previous => Some(0),
            _ => Some(index.max(1)),
        };
        state.snapshot = current;
    }
}
