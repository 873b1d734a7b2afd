//! Stream changes from the etcd watch API.
use std::collections::VecDeque;

use anyhow::Context as AnyContext;
use anyhow::Result;
use futures::stream::BoxStream;
use futures::StreamExt;

use authproxy_store::errors::Unavailable;
use authproxy_store::Version;
use authproxy_store::WatchEvent;
use authproxy_store::WatchStream;

use crate::protocol::WatchRequest;

/// Progress of an etcd watch stream.
struct WatchState {
    body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    buffer: Vec<u8>,
    client: reqwest::Client,
    events: VecDeque<WatchEvent>,
    request: WatchRequest,
    url: String,
}

/// Lazily open a watch on all keys under `prefix`.
///
/// The watch request is sent when the stream is first polled.
/// The stream ends after the first error: callers resume by watching again
/// from the version of the last event they processed.
pub fn watch(
    client: reqwest::Client,
    url: String,
    prefix: &str,
    since: Option<Version>,
) -> WatchStream {
    let state = WatchState {
        body: None,
        buffer: Vec::new(),
        client,
        events: VecDeque::new(),
        request: WatchRequest::prefix(prefix, since),
        url,
    };
    let stream = futures::stream::try_unfold(state, next_event);
    Box::pin(stream)
}

/// Wait for the next event, opening the watch request if needed.
async fn next_event(mut state: WatchState) -> Result<Option<(WatchEvent, WatchState)>> {
    loop {
        if let Some(event) = state.events.pop_front() {
            return Ok(Some((event, state)));
        }

        if state.body.is_none() {
            let response = state
                .client
                .post(&state.url)
                .json(&state.request)
                .send()
                .await
                .context(Unavailable)?;
            let response = crate::client::check_status(response).await?;
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map(|chunk| chunk.to_vec()))
                .boxed();
            state.body = Some(body);
        }

        let chunk = match state.body.as_mut() {
            None => continue,
            Some(body) => body.next().await,
        };
        match chunk {
            None => anyhow::bail!(Unavailable),
            Some(Err(error)) => return Err(anyhow::Error::from(error).context(Unavailable)),
            Some(Ok(chunk)) => {
                state.buffer.extend_from_slice(&chunk);
                crate::protocol::drain_watch_lines(&mut state.buffer, &mut state.events)?;
            }
        }
    }
}
