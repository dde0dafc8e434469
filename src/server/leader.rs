//! Leader election and the leader maintenance loop.
//!
//! One task per replica runs the three-state machine:
//!
//! - **Follower**: if a leader record exists, watch it and block until
//!   the key is deleted or its lease expires.
//! - **Campaigning**: grant a lease and try to claim the leader key with
//!   a create-revision-zero transaction. Losing the race returns to
//!   Follower.
//! - **Leader**: build this term's subsystems, sync the timestamp oracle
//!   and load cluster state *before* publishing them, then service the
//!   lease keep-alive and the oracle tick until either fails.
//!
//! Any exit from the Leader state runs the same teardown, in order: the
//! published handles are dropped (requests answer `NotLeader` from that
//! instant), every live client connection is force-closed so clients
//! re-resolve, and the lease is revoked so the key disappears promptly
//! instead of waiting out its TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::cluster::{
    BalancedPlacement, ClusterResult, ClusterState, ControlCore, IdAllocator, LeaderHandles,
    LeaderLock, TimestampOracle, metrics,
};
use crate::constants::{CAMPAIGN_RETRY_DELAY_MS, DEFAULT_MAX_REPLICAS};
use crate::meta::{Compare, KeepAliveStream, Txn, TxnOp};
use crate::model::LeaderRecord;

use super::ConnectionRegistry;

/// Outcome of one campaign attempt.
enum Campaign {
    /// Won and subsequently demoted; the term ran its course.
    Led,
    /// Another candidate claimed the key first.
    Lost,
}

/// Run the election state machine until `shutdown` fires.
///
/// Spawn this once per replica, on the control-plane runtime.
pub async fn election_loop(
    core: Arc<ControlCore>,
    registry: Arc<ConnectionRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("election loop started");
    let retry_delay = Duration::from_millis(CAMPAIGN_RETRY_DELAY_MS);

    loop {
        // Follower: defer to an existing leader until its key goes away.
        tokio::select! {
            _ = shutdown.recv() => break,
            observed = follow_existing_leader(&core) => {
                if let Err(e) = observed {
                    tracing::warn!(error = %e, "failed to observe current leader");
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
            }
        }

        tokio::select! {
            _ = shutdown.recv() => break,
            outcome = campaign(&core, &registry) => match outcome {
                Ok(Campaign::Led) => {
                    tracing::info!("leadership ended, returning to follower");
                }
                Ok(Campaign::Lost) => {
                    tracing::debug!("lost campaign, returning to follower");
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "campaign failed");
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    // Shutdown can land mid-term; the teardown must still happen.
    core.clear_leader();
    metrics::IS_LEADER.set(0);
    registry.close_all();
    tracing::info!("election loop stopped");
}

/// Block while another process holds the leader key.
async fn follow_existing_leader(core: &Arc<ControlCore>) -> ClusterResult<()> {
    let Some(leader) = core.current_leader().await? else {
        return Ok(());
    };
    tracing::info!(addr = %leader.addr, pid = leader.pid, "leader exists, watching");

    let leader_key = core.layout().leader();
    let mut watch = core.meta().watch(&leader_key).await?;

    // The key may have vanished between the read and the watch
    // registration; re-check so we do not wait for an event that
    // already happened.
    if core.meta().get(&leader_key).await?.is_none() {
        return Ok(());
    }

    while let Some(event) = watch.recv().await {
        if event.is_removal() {
            tracing::info!("leader key expired or deleted");
            return Ok(());
        }
    }
    // Watch stream ended; treat as a cue to re-evaluate.
    Ok(())
}

/// One campaign: claim the key under a fresh lease, lead until demoted.
async fn campaign(
    core: &Arc<ControlCore>,
    registry: &Arc<ConnectionRegistry>,
) -> ClusterResult<Campaign> {
    let meta = core.meta();
    let config = core.config();
    let leader_key = core.layout().leader();

    let lease = meta.lease_grant(config.leader_lease()).await?;
    let record = LeaderRecord {
        addr: config.advertised().to_string(),
        pid: std::process::id(),
    }
    .to_bytes();

    // The leader key must not exist, so its create revision is zero.
    let claim = Txn::new()
        .when(Compare::absent(leader_key.clone()))
        .then(TxnOp::put_with_lease(
            leader_key.clone(),
            record.clone(),
            lease,
        ));

    if !meta.txn(claim).await?.succeeded {
        tracing::debug!("leader key already claimed");
        let _ = meta.lease_revoke(lease).await;
        return Ok(Campaign::Lost);
    }

    tracing::info!(lease = %lease, "campaign won");

    let keepalive = match meta.lease_keep_alive(lease).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = meta.lease_revoke(lease).await;
            return Err(e.into());
        }
    };

    let led = lead(core, record, keepalive).await;

    // Teardown, in order: drop the term's subsystems, hard-close every
    // client connection, release the key.
    core.clear_leader();
    metrics::IS_LEADER.set(0);
    registry.close_all();
    let _ = meta.lease_revoke(lease).await;

    match led {
        Ok(()) => Ok(Campaign::Led),
        Err(e) if e.is_fatal_for_term() => {
            tracing::warn!("abdicating after losing a guarded write");
            Ok(Campaign::Led)
        }
        Err(e) => Err(e),
    }
}

/// The Leader state: build, publish, and maintain this term.
async fn lead(
    core: &Arc<ControlCore>,
    record: bytes::Bytes,
    mut keepalive: KeepAliveStream,
) -> ClusterResult<()> {
    let config = core.config();
    let layout = core.layout();
    let meta = core.meta().clone();

    let lock = Arc::new(LeaderLock::new(layout.leader(), record));
    let alloc = Arc::new(IdAllocator::new(
        meta.clone(),
        lock.clone(),
        layout.alloc_id(),
        config.alloc_step,
    ));
    let tso = TimestampOracle::new(
        meta.clone(),
        lock.clone(),
        layout.timestamp(),
        config.tso_save_interval_ms,
        config.tso_max_logical,
    );
    let state = ClusterState::new(
        meta,
        lock.clone(),
        layout.clone(),
        alloc.clone(),
        Arc::new(BalancedPlacement),
        config.cluster_id,
        DEFAULT_MAX_REPLICAS,
    );

    // No traffic until the oracle is synced and state is loaded.
    tso.sync().await?;
    state.load().await?;

    let handles = Arc::new(LeaderHandles {
        lock,
        tso,
        alloc,
        state,
    });
    core.publish_leader(handles.clone());
    metrics::IS_LEADER.set(1);
    metrics::LEADER_TERMS.inc();
    tracing::info!("assumed leadership");

    let mut ticker = tokio::time::interval(config.tso_update_step());
    loop {
        tokio::select! {
            ack = keepalive.recv() => {
                if ack.is_none() {
                    tracing::info!("keep-alive channel closed");
                    return Ok(());
                }
            }
            _ = ticker.tick() => {
                // A failed checkpoint write means leadership is gone;
                // propagate and abdicate rather than issue stale time.
                handles.tso.advance().await?;
            }
        }
    }
}
