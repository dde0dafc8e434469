//! Handler trait for processing wire requests.
//!
//! Implement [`Handler`] to define how a server answers each command.
//! Handlers return `ClusterResult`s; the connection loop maps an `Err`
//! onto a typed error body carried back with the original correlation
//! id, so logical failures never cost the client its connection. The
//! production implementation is
//! [`ControlHandler`](crate::cluster::ControlHandler).

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::cluster::ClusterResult;

use super::request::*;
use super::response::*;

/// Context for one request, carrying connection information.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The client's address.
    pub client_addr: SocketAddr,
    /// Correlation id from the frame.
    pub correlation_id: u64,
    /// Unique request id for correlating logs and traces.
    pub request_id: uuid::Uuid,
}

/// Trait for answering placement-driver commands.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Issue a batch of timestamps.
    async fn handle_tso(
        &self,
        ctx: &RequestContext,
        request: TsoRequestData,
    ) -> ClusterResult<TsoResponseData>;

    /// Allocate one unique ID.
    async fn handle_alloc_id(&self, ctx: &RequestContext) -> ClusterResult<AllocIdResponseData>;

    /// Initialise the cluster exactly once.
    async fn handle_bootstrap(
        &self,
        ctx: &RequestContext,
        request: BootstrapRequestData,
    ) -> ClusterResult<BootstrapResponseData>;

    /// Report whether the cluster has been bootstrapped.
    async fn handle_is_bootstrapped(
        &self,
        ctx: &RequestContext,
    ) -> ClusterResult<IsBootstrappedResponseData>;

    /// Fetch a store record.
    async fn handle_get_store(
        &self,
        ctx: &RequestContext,
        request: GetStoreRequestData,
    ) -> ClusterResult<GetStoreResponseData>;

    /// Create or update a store record.
    async fn handle_put_store(
        &self,
        ctx: &RequestContext,
        request: PutStoreRequestData,
    ) -> ClusterResult<PutStoreResponseData>;

    /// Locate the region containing a key.
    async fn handle_get_region(
        &self,
        ctx: &RequestContext,
        request: GetRegionRequestData,
    ) -> ClusterResult<GetRegionResponseData>;

    /// Fetch the cluster config record.
    async fn handle_get_cluster_config(
        &self,
        ctx: &RequestContext,
    ) -> ClusterResult<GetClusterConfigResponseData>;

    /// Replace the cluster config record.
    async fn handle_put_cluster_config(
        &self,
        ctx: &RequestContext,
        request: PutClusterConfigRequestData,
    ) -> ClusterResult<PutClusterConfigResponseData>;

    /// Arbitrate a region split request.
    async fn handle_ask_split(
        &self,
        ctx: &RequestContext,
        request: AskSplitRequestData,
    ) -> ClusterResult<AskSplitResponseData>;

    /// Arbitrate a change-peer request.
    async fn handle_ask_change_peer(
        &self,
        ctx: &RequestContext,
        request: AskChangePeerRequestData,
    ) -> ClusterResult<AskChangePeerResponseData>;
}
