//! gRPC service implementation for the filter registry.
//!
//! This module defines [`FilterService`], the concrete implementation of the
//! [`CuckooFilter`] gRPC service defined in `cuckoo.proto`. Unary
//! calls are answered inline by the [`Dispatcher`]; streaming lookups run a
//! reader task per session via [`feed_lookups`].
//!
//! ## Responsibilities
//!
//! - Translate protobuf requests into dispatcher calls and wrap the resulting
//!   [`FilterStatus`] into responses.
//! - Spawn and account for streaming lookup sessions.
//! - Refuse new calls once shutdown starts, drain open sessions, then cancel
//!   whatever is left.

use super::dispatcher::Dispatcher;
use crate::server::{
    config::ServerConfig,
    registry::Registry,
    streaming::coordinator::feed_lookups,
    telemetry::{
        decrement_streams_inflight, increment_requests, increment_stream_errors,
        increment_stream_matches, increment_streams_inflight, record_stream_duration,
    },
};
use core::{pin::Pin, time::Duration};
use cuckoo_tonic_core::{
    Error, FilterStatus,
    proto::{
        CountElementsRequest, CountElementsResponse, CreateFilterRequest, CreateFilterResponse,
        DeleteElementRequest, DeleteElementResponse, DeleteFilterRequest, DeleteFilterResponse,
        InsertElementRequest, InsertElementResponse, InsertElementsRequest,
        InsertElementsResponse, ListFiltersRequest, ListFiltersResponse, LookupElementRequest,
        LookupElementResponse, LookupElementsRequest, LookupElementsResponse,
        LookupElementsStreamRequest, LookupElementsStreamResponse, ResetFilterRequest,
        ResetFilterResponse, cuckoo_filter_server::CuckooFilter,
    },
};
use futures::TryStreamExt;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{sync::Arc, time::Instant};
use tokio::{sync::mpsc, time::sleep};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

/// State shared by every clone of the service.
#[derive(Debug, Default)]
struct Lifecycle {
    shutting_down: AtomicBool,
    streams_inflight: AtomicUsize,
    cancel: CancellationToken,
}

/// Decrements the in-flight session count when a session ends, however it
/// ends.
struct InflightGuard(Arc<Lifecycle>);

impl InflightGuard {
    fn new(lifecycle: Arc<Lifecycle>) -> Self {
        lifecycle.streams_inflight.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();
        Self(lifecycle)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.streams_inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
    }
}

/// gRPC front end of the filter registry.
///
/// Cheap to clone; clones share the registry and the shutdown state.
#[derive(Clone, Debug)]
pub struct FilterService {
    dispatcher: Dispatcher,
    stream_buffer_size: usize,
    lifecycle: Arc<Lifecycle>,
}

impl FilterService {
    pub fn new(registry: Arc<Registry>, config: &ServerConfig) -> Self {
        Self::with_stream_buffer(registry, config.stream_buffer_size)
    }

    /// Creates a service with an explicit outbound queue depth per streaming
    /// session.
    pub fn with_stream_buffer(registry: Arc<Registry>, stream_buffer_size: usize) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
            stream_buffer_size: stream_buffer_size.max(1),
            lifecycle: Arc::default(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Number of streaming sessions currently open.
    pub fn streams_inflight(&self) -> usize {
        self.lifecycle.streams_inflight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lifecycle.shutting_down.load(Ordering::Acquire)
    }

    fn ensure_serving(&self) -> Result<(), Status> {
        if self.is_shutting_down() {
            Err(Error::ServiceShutdown.into())
        } else {
            Ok(())
        }
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new calls with `UNAVAILABLE`.
    /// - Waits up to `timeout` for open streaming sessions to finish.
    /// - Cancels the sessions still open after that.
    pub async fn shutdown(&self, timeout: Duration) {
        // === Phase 0: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.lifecycle.shutting_down.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight streams to drain ===
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drained = tokio::time::timeout(timeout, async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight streams drained successfully"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} streams still active)",
                self.streams_inflight()
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.lifecycle.cancel.cancel();
    }
}

#[tonic::async_trait]
impl CuckooFilter for FilterService {
    type LookupElementsStreamStream =
        Pin<Box<dyn Stream<Item = Result<LookupElementsStreamResponse, Status>> + Send>>;

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name, capacity = req.get_ref().capacity))]
    async fn create_filter(
        &self,
        req: Request<CreateFilterRequest>,
    ) -> Result<Response<CreateFilterResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("create_filter");

        let req = req.into_inner();
        let status = self.dispatcher.create_filter(&req.filter_name, req.capacity);
        tracing::debug!(%status, "CreateFilter");

        Ok(Response::new(CreateFilterResponse {
            status: status.into_proto(),
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name))]
    async fn delete_filter(
        &self,
        req: Request<DeleteFilterRequest>,
    ) -> Result<Response<DeleteFilterResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("delete_filter");

        let status = self.dispatcher.delete_filter(&req.get_ref().filter_name);

        Ok(Response::new(DeleteFilterResponse {
            status: status.into_proto(),
        }))
    }

    #[tracing::instrument(skip_all)]
    async fn list_filters(
        &self,
        _req: Request<ListFiltersRequest>,
    ) -> Result<Response<ListFiltersResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("list_filters");

        Ok(Response::new(ListFiltersResponse {
            status: FilterStatus::Ok.into_proto(),
            filters: self.dispatcher.list_filters(),
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name))]
    async fn insert_element(
        &self,
        req: Request<InsertElementRequest>,
    ) -> Result<Response<InsertElementResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("insert_element");

        let req = req.get_ref();
        let status = self
            .dispatcher
            .insert_element(&req.filter_name, &req.element);

        Ok(Response::new(InsertElementResponse {
            status: status.into_proto(),
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name, batch = req.get_ref().elements.len()))]
    async fn insert_elements(
        &self,
        req: Request<InsertElementsRequest>,
    ) -> Result<Response<InsertElementsResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("insert_elements");

        let req = req.get_ref();
        let (status, failed_elements) = self
            .dispatcher
            .insert_elements(&req.filter_name, &req.elements);
        if !failed_elements.is_empty() {
            tracing::debug!(failed = failed_elements.len(), "Partial batch insert");
        }

        Ok(Response::new(InsertElementsResponse {
            status: status.into_proto(),
            failed_elements,
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name))]
    async fn delete_element(
        &self,
        req: Request<DeleteElementRequest>,
    ) -> Result<Response<DeleteElementResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("delete_element");

        let req = req.get_ref();
        let status = self
            .dispatcher
            .delete_element(&req.filter_name, &req.element);

        Ok(Response::new(DeleteElementResponse {
            status: status.into_proto(),
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name))]
    async fn lookup_element(
        &self,
        req: Request<LookupElementRequest>,
    ) -> Result<Response<LookupElementResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("lookup_element");

        let req = req.get_ref();
        let status = self
            .dispatcher
            .lookup_element(&req.filter_name, &req.element);

        Ok(Response::new(LookupElementResponse {
            status: status.into_proto(),
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name, batch = req.get_ref().elements.len()))]
    async fn lookup_elements(
        &self,
        req: Request<LookupElementsRequest>,
    ) -> Result<Response<LookupElementsResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("lookup_elements");

        let req = req.get_ref();
        let (status, elements) = self
            .dispatcher
            .lookup_elements(&req.filter_name, &req.elements);

        Ok(Response::new(LookupElementsResponse {
            status: status.into_proto(),
            elements,
        }))
    }

    /// Opens a streaming lookup session.
    ///
    /// A reader task consumes the inbound stream and queues matches on a
    /// bounded channel of `stream_buffer_size`; the returned stream drains
    /// that channel. The session ends when the client half-closes and every
    /// queued match has been sent, or early on a transport error, client
    /// disconnect or service shutdown.
    #[tracing::instrument(skip_all)]
    async fn lookup_elements_stream(
        &self,
        req: Request<Streaming<LookupElementsStreamRequest>>,
    ) -> Result<Response<Self::LookupElementsStreamStream>, Status> {
        self.ensure_serving()?;
        increment_requests("lookup_elements_stream");

        let start = Instant::now();
        let guard = InflightGuard::new(Arc::clone(&self.lifecycle));
        let inbound = req.into_inner();

        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<LookupElementsStreamResponse, Status>>(self.stream_buffer_size);

        let registry = Arc::clone(self.dispatcher.registry());
        let cancel = self.lifecycle.cancel.child_token();

        let fut = async move {
            let _guard = guard;
            match feed_lookups(inbound, registry, resp_tx, cancel).await {
                Ok(matches) => {
                    increment_stream_matches(matches);
                    record_stream_duration(start.elapsed().as_secs_f64() * 1000.0);
                    tracing::debug!(matches, "Streaming lookup finished");
                }
                Err(Error::RequestCancelled) => {
                    tracing::debug!("Client went away mid-stream");
                }
                Err(e) => {
                    increment_stream_errors();
                    tracing::warn!("Streaming lookup aborted: {e}");
                }
            }
        };

        tokio::spawn(fut.instrument(tracing::info_span!("streaming")));

        let stream = ReceiverStream::new(resp_rx).inspect_err(|_e| {
            increment_stream_errors();
        });

        Ok(Response::new(Box::pin(stream)))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name))]
    async fn count_elements(
        &self,
        req: Request<CountElementsRequest>,
    ) -> Result<Response<CountElementsResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("count_elements");

        let (status, len) = self.dispatcher.count_elements(&req.get_ref().filter_name);

        Ok(Response::new(CountElementsResponse {
            status: status.into_proto(),
            len,
        }))
    }

    #[tracing::instrument(skip_all, fields(filter = %req.get_ref().filter_name))]
    async fn reset_filter(
        &self,
        req: Request<ResetFilterRequest>,
    ) -> Result<Response<ResetFilterResponse>, Status> {
        self.ensure_serving()?;
        increment_requests("reset_filter");

        let status = self.dispatcher.reset_filter(&req.get_ref().filter_name);

        Ok(Response::new(ResetFilterResponse {
            status: status.into_proto(),
        }))
    }
}
