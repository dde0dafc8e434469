//! The production request handler, gated on leadership.
//!
//! Every command resolves the current term's
//! [`LeaderHandles`](super::LeaderHandles) first; a
//! follower answers `NotLeader` and the connection loop hangs up after
//! responding, forcing the client to re-resolve the leader. Command
//! bodies delegate to the timestamp oracle, the ID allocator, and the
//! cluster state owned by the term.

use std::sync::Arc;

use async_trait::async_trait;

use crate::server::handler::{Handler, RequestContext};
use crate::server::request::*;
use crate::server::response::*;

use super::error::ClusterResult;
use super::ControlCore;

/// [`Handler`] implementation backed by a [`ControlCore`].
#[derive(Clone)]
pub struct ControlHandler {
    core: Arc<ControlCore>,
}

impl ControlHandler {
    pub fn new(core: Arc<ControlCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Handler for ControlHandler {
    async fn handle_tso(
        &self,
        ctx: &RequestContext,
        request: TsoRequestData,
    ) -> ClusterResult<TsoResponseData> {
        let handles = self.core.leader_handles()?;
        let timestamps = handles.tso.timestamps(request.count)?;
        tracing::trace!(
            request_id = %ctx.request_id,
            count = request.count,
            "issued timestamp batch"
        );
        Ok(TsoResponseData { timestamps })
    }

    async fn handle_alloc_id(&self, _ctx: &RequestContext) -> ClusterResult<AllocIdResponseData> {
        let handles = self.core.leader_handles()?;
        let id = handles.alloc.alloc().await?;
        Ok(AllocIdResponseData { id })
    }

    async fn handle_bootstrap(
        &self,
        ctx: &RequestContext,
        request: BootstrapRequestData,
    ) -> ClusterResult<BootstrapResponseData> {
        let handles = self.core.leader_handles()?;
        tracing::info!(
            request_id = %ctx.request_id,
            store = %request.store.id,
            region = %request.region.id,
            "bootstrap requested"
        );
        handles.state.bootstrap(request.store, request.region).await?;
        Ok(BootstrapResponseData)
    }

    async fn handle_is_bootstrapped(
        &self,
        _ctx: &RequestContext,
    ) -> ClusterResult<IsBootstrappedResponseData> {
        let handles = self.core.leader_handles()?;
        Ok(IsBootstrappedResponseData {
            bootstrapped: handles.state.is_bootstrapped(),
        })
    }

    async fn handle_get_store(
        &self,
        _ctx: &RequestContext,
        request: GetStoreRequestData,
    ) -> ClusterResult<GetStoreResponseData> {
        let handles = self.core.leader_handles()?;
        let store = handles.state.get_store(request.store_id)?;
        Ok(GetStoreResponseData { store })
    }

    async fn handle_put_store(
        &self,
        ctx: &RequestContext,
        request: PutStoreRequestData,
    ) -> ClusterResult<PutStoreResponseData> {
        let handles = self.core.leader_handles()?;
        tracing::info!(
            request_id = %ctx.request_id,
            store = %request.store.id,
            address = %request.store.address,
            "put store"
        );
        handles.state.put_store(request.store).await?;
        Ok(PutStoreResponseData)
    }

    async fn handle_get_region(
        &self,
        _ctx: &RequestContext,
        request: GetRegionRequestData,
    ) -> ClusterResult<GetRegionResponseData> {
        let handles = self.core.leader_handles()?;
        let region = handles.state.get_region(&request.region_key)?;
        Ok(GetRegionResponseData { region })
    }

    async fn handle_get_cluster_config(
        &self,
        _ctx: &RequestContext,
    ) -> ClusterResult<GetClusterConfigResponseData> {
        let handles = self.core.leader_handles()?;
        let cluster = handles.state.get_meta()?;
        Ok(GetClusterConfigResponseData { cluster })
    }

    async fn handle_put_cluster_config(
        &self,
        ctx: &RequestContext,
        request: PutClusterConfigRequestData,
    ) -> ClusterResult<PutClusterConfigResponseData> {
        let handles = self.core.leader_handles()?;
        tracing::info!(
            request_id = %ctx.request_id,
            max_replicas = request.cluster.max_replicas,
            "put cluster config"
        );
        handles.state.put_meta(request.cluster).await?;
        Ok(PutClusterConfigResponseData)
    }

    async fn handle_ask_split(
        &self,
        ctx: &RequestContext,
        request: AskSplitRequestData,
    ) -> ClusterResult<AskSplitResponseData> {
        let handles = self.core.leader_handles()?;
        tracing::info!(
            request_id = %ctx.request_id,
            region = %request.region.id,
            "ask split"
        );
        let (new_region_id, new_peer_ids) = handles
            .state
            .handle_ask_split(&request.region, request.leader_store_id, &request.split_key)
            .await?;
        Ok(AskSplitResponseData {
            new_region_id,
            new_peer_ids,
        })
    }

    async fn handle_ask_change_peer(
        &self,
        ctx: &RequestContext,
        request: AskChangePeerRequestData,
    ) -> ClusterResult<AskChangePeerResponseData> {
        let handles = self.core.leader_handles()?;
        tracing::info!(
            request_id = %ctx.request_id,
            region = %request.region.id,
            "ask change peer"
        );
        handles
            .state
            .handle_ask_change_peer(&request.region, request.leader_store_id)
            .await?;
        Ok(AskChangePeerResponseData)
    }
}
