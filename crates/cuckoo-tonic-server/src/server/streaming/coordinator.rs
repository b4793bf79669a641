use super::processor::match_request;
use crate::server::registry::Registry;
use cuckoo_tonic_core::{
    Error,
    proto::{LookupElementsStreamRequest, LookupElementsStreamResponse},
};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Drives the inbound half of a streaming lookup session.
///
/// Reads lookup requests from the client, evaluates each one against the
/// registry and forwards matches to the outbound channel, which the gRPC
/// layer drains into the response stream. The two halves share nothing but
/// the registry and this channel.
///
/// # Arguments
///
/// - `inbound`: Requests received from the client.
/// - `registry`: Registry the lookups run against.
/// - `resp_tx`: Channel feeding the outbound response stream.
/// - `shutdown`: Cancelled when the service stops waiting for open sessions.
///
/// # Behavior
///
/// - Returns `Ok(matches)` once the client half-closes; dropping `resp_tx`
///   then lets the outbound stream flush and finish.
/// - Non-matches and unknown filters are skipped.
/// - An inbound transport error aborts the session; the error is forwarded to
///   the client (best effort) and returned.
/// - Exits early if the client stops reading or the service shuts down.
pub async fn feed_lookups<S>(
    mut inbound: S,
    registry: Arc<Registry>,
    resp_tx: mpsc::Sender<Result<LookupElementsStreamResponse, Status>>,
    shutdown: CancellationToken,
) -> cuckoo_tonic_core::Result<u64>
where
    S: Stream<Item = Result<LookupElementsStreamRequest, Status>> + Unpin,
{
    let mut matches = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(abort(&resp_tx, Error::ServiceShutdown)),
            () = resp_tx.closed() => return Err(Error::RequestCancelled),
            next = inbound.next() => next,
        };

        let req = match next {
            Some(Ok(req)) => req,
            Some(Err(status)) => return Err(abort(&resp_tx, Error::Stream(status))),
            None => return Ok(matches),
        };

        let Some(resp) = match_request(&registry, req) else {
            continue;
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(abort(&resp_tx, Error::ServiceShutdown)),
            sent = resp_tx.send(Ok(resp)) => {
                if sent.is_err() {
                    return Err(Error::RequestCancelled);
                }
            }
        }
        matches += 1;
    }
}

/// Surfaces a terminal error to the client without waiting on a full queue.
///
/// The client may already be gone, so a failed hand-off is only logged.
fn abort(
    resp_tx: &mpsc::Sender<Result<LookupElementsStreamResponse, Status>>,
    err: Error,
) -> Error {
    let status = match &err {
        Error::Stream(status) => status.clone(),
        Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        other => Status::internal(other.to_string()),
    };

    if let Err(_e) = resp_tx.try_send(Err(status)) {
        tracing::debug!("Failed to forward stream error: {_e}");
    }
    err
}
