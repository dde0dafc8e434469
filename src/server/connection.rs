//! Client connection handling.
//!
//! One task per connection runs a read → dispatch → respond loop over
//! 8 KiB buffered halves of the socket. Responses echo the request's
//! correlation id and header, in request order.
//!
//! Error policy, per the transport/logical split:
//! - logical failures travel as typed error bodies; the connection stays
//!   open and the client keeps reusing it
//! - `NotLeader` is answered first, then the connection is closed so the
//!   client re-resolves the leader
//! - malformed frames, over-cap frames, and I/O failures drop the
//!   connection
//!
//! A close signal from the server (leadership lost, shutdown) interrupts
//! the read mid-flight.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::cluster::metrics;
use crate::constants::{READ_BUFFER_SIZE, WRITE_BUFFER_SIZE};
use crate::error::{Error, ErrorCode, Result};
use crate::protocol::{read_frame, write_frame};

use super::handler::{Handler, RequestContext};
use super::request::Request;
use super::response::Response;

/// Dispatch one parsed payload to the handler and encode the response.
///
/// Returns the response payload and whether the connection must close
/// after writing it (`NotLeader` answers).
async fn dispatch_request<H: Handler>(
    handler: &H,
    payload: Bytes,
    client_addr: SocketAddr,
    correlation_id: u64,
) -> Result<(Vec<u8>, bool)> {
    let start = Instant::now();

    let request = match Request::parse(payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(client = %client_addr, error = ?e, "failed to parse request");
            return Err(e);
        }
    };

    let cmd = request.cmd();
    let header = *request.header();
    let response_header = header.into();
    let ctx = RequestContext {
        client_addr,
        correlation_id,
        request_id: uuid::Uuid::new_v4(),
    };

    tracing::debug!(
        request_id = %ctx.request_id,
        command = cmd.as_str(),
        client = %client_addr,
        correlation_id,
        "handling request"
    );

    let result = match request {
        Request::Tso(_, body) => handler
            .handle_tso(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::AllocId(_) => handler
            .handle_alloc_id(&ctx)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::Bootstrap(_, body) => handler
            .handle_bootstrap(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::IsBootstrapped(_) => handler
            .handle_is_bootstrapped(&ctx)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::GetStore(_, body) => handler
            .handle_get_store(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::PutStore(_, body) => handler
            .handle_put_store(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::GetRegion(_, body) => handler
            .handle_get_region(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::GetClusterConfig(_) => handler
            .handle_get_cluster_config(&ctx)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::PutClusterConfig(_, body) => handler
            .handle_put_cluster_config(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::AskSplit(_, body) => handler
            .handle_ask_split(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::AskChangePeer(_, body) => handler
            .handle_ask_change_peer(&ctx, body)
            .await
            .and_then(|r| Response::ok(cmd, response_header, &r).map_err(Into::into)),
        Request::Unknown(_, raw) => {
            tracing::warn!(client = %client_addr, command = raw, "unsupported command");
            Err(crate::cluster::ClusterError::InvalidRequest(format!(
                "unsupported command {raw}"
            )))
        }
    };

    let (response, status, close) = match result {
        Ok(response) => (response, "success", false),
        Err(e) => {
            let code = e.to_error_code();
            tracing::debug!(
                request_id = %ctx.request_id,
                command = cmd.as_str(),
                code = ?code,
                error = %e,
                "request failed"
            );
            (
                Response::error(cmd, response_header, code, e.to_string()),
                "error",
                code == ErrorCode::NotLeader,
            )
        }
    };

    metrics::record_request(cmd.as_str(), status, start.elapsed().as_secs_f64());
    Ok((response.encode()?, close))
}

/// A client connection to the placement server.
pub struct ClientConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    addr: SocketAddr,
}

impl ClientConnection {
    /// Wrap an accepted stream in buffered halves.
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, read_half),
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, write_half),
            addr,
        }
    }

    /// Serve requests until the peer disconnects, a transport error
    /// occurs, or the server signals close.
    pub async fn handle_requests<H: Handler>(
        &mut self,
        handler: Arc<H>,
        max_frame_size: usize,
        close_signal: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = close_signal.recv() => {
                    tracing::debug!(client = %self.addr, "connection closed by server");
                    return Ok(());
                }

                frame = read_frame(&mut self.reader, max_frame_size) => {
                    match frame {
                        Ok((correlation_id, payload)) => {
                            let (response, close_after) = dispatch_request(
                                handler.as_ref(),
                                payload,
                                self.addr,
                                correlation_id,
                            )
                            .await?;
                            write_frame(&mut self.writer, correlation_id, &response).await?;
                            if close_after {
                                tracing::debug!(
                                    client = %self.addr,
                                    "closing connection after not-leader response"
                                );
                                return Ok(());
                            }
                        }
                        Err(Error::MissingData(_)) => {
                            tracing::debug!(client = %self.addr, "client disconnected");
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::error!(client = %self.addr, error = ?e, "transport error");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}
