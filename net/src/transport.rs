//! Transport proxy used by a member to reach its remote peer.
//!
//! The cluster core only sees the [`Transport`] and [`Connector`] traits;
//! the TCP implementation below is the single networking transport shipped
//! with the daemon. Tests substitute in-memory implementations.

use crate::framing::{frames, recv_message, send_message};
use async_trait::async_trait;
use futures::SinkExt;
use ripcord_common::{Result, RipcordError, RpcRequest, RpcResponse};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// An established connection to one remote member. Exclusively owned by
/// that member; not shared.
#[async_trait]
pub trait Transport: Send {
    /// Send one request and wait for the reply
    async fn send(&mut self, request: &RpcRequest) -> Result<RpcResponse>;

    /// Close the connection. Best-effort; the transport is unusable afterwards.
    async fn close(&mut self);

    /// Whether the connection is still usable
    fn is_open(&self) -> bool;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("is_open", &self.is_open())
            .finish()
    }
}

/// Establishes [`Transport`] connections to remote members
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str, identity: &str) -> Result<Box<dyn Transport>>;
}

/// TCP transport speaking length-delimited JSON frames
pub struct TcpTransport {
    framed: Option<Framed<TcpStream, LengthDelimitedCodec>>,
    peer: String,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, request: &RpcRequest) -> Result<RpcResponse> {
        let peer = self.peer.clone();
        let framed = self.framed.as_mut().ok_or(RipcordError::NotConnected)?;

        let reply = tokio::time::timeout(RPC_TIMEOUT, async {
            send_message(framed, request).await?;
            recv_message::<_, RpcResponse>(framed).await
        })
        .await
        .map_err(|_| RipcordError::Transport(format!("rpc to {peer} timed out")))??;

        match reply {
            Some(response) => Ok(response),
            None => {
                self.framed = None;
                Err(RipcordError::Transport(format!(
                    "connection to {peer} closed by peer"
                )))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            let _ = framed.close().await;
            debug!(peer = %self.peer, "connection closed");
        }
    }

    fn is_open(&self) -> bool {
        self.framed.is_some()
    }
}

/// Connector producing [`TcpTransport`] connections
#[derive(Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str, identity: &str) -> Result<Box<dyn Transport>> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| {
                RipcordError::Transport(format!("connect to {identity} at {address} timed out"))
            })?
            .map_err(|e| {
                RipcordError::Transport(format!("connect to {identity} at {address} failed: {e}"))
            })?;
        let _ = stream.set_nodelay(true);

        debug!(peer = %identity, address = %address, "connection established");
        Ok(Box::new(TcpTransport {
            framed: Some(frames(stream)),
            peer: identity.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripcord_common::MemberStatus;
    use tokio::net::TcpListener;

    async fn spawn_echo_peer() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = frames(stream);
            while let Ok(Some(_request)) = recv_message::<_, RpcRequest>(&mut framed).await {
                send_message(&mut framed, &RpcResponse::ok_with_status(MemberStatus::Passive))
                    .await
                    .unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_tcp_transport_round_trip() {
        let addr = spawn_echo_peer().await;

        let connector = TcpConnector;
        let mut transport = connector
            .connect(&addr.to_string(), "node-b")
            .await
            .unwrap();
        assert!(transport.is_open());

        let response = transport
            .send(&RpcRequest::HealthCheck {
                sender: "node-a".to_string(),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.status, Some(MemberStatus::Passive));

        transport.close().await;
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_send_after_close_is_not_connected() {
        let addr = spawn_echo_peer().await;

        let connector = TcpConnector;
        let mut transport = connector
            .connect(&addr.to_string(), "node-b")
            .await
            .unwrap();
        transport.close().await;

        let err = transport
            .send(&RpcRequest::HealthCheck {
                sender: "node-a".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RipcordError::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_peer_fails() {
        let connector = TcpConnector;
        // Port 1 on localhost should refuse immediately.
        let err = connector.connect("127.0.0.1:1", "node-b").await.unwrap_err();
        assert!(matches!(err, RipcordError::Transport(_)));
    }
}
