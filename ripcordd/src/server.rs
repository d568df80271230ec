//! Inbound RPC listener: one length-delimited JSON frame per request,
//! one response frame back on the same connection.

use ripcord_cluster::Memberlist;
use ripcord_common::{MemberStatus, Result, RpcRequest, RpcResponse};
use ripcord_net::{frames, recv_message, send_message, BackendRegistry};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Bind and serve the daemon's RPC port
pub async fn serve(
    address: &str,
    memberlist: Arc<Memberlist>,
    registry: Arc<BackendRegistry>,
) -> Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %address, "daemon listening");
    serve_on(listener, memberlist, registry).await
}

pub async fn serve_on(
    listener: TcpListener,
    memberlist: Arc<Memberlist>,
    registry: Arc<BackendRegistry>,
) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let memberlist = memberlist.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, memberlist, registry).await {
                warn!(peer = %peer, error = %e, "connection handler failed");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    memberlist: Arc<Memberlist>,
    registry: Arc<BackendRegistry>,
) -> Result<()> {
    let mut framed = frames(stream);
    while let Some(request) = recv_message::<_, RpcRequest>(&mut framed).await? {
        let response = dispatch(&request, &memberlist, &registry).await;
        send_message(&mut framed, &response).await?;
    }
    Ok(())
}

async fn dispatch(
    request: &RpcRequest,
    memberlist: &Memberlist,
    registry: &BackendRegistry,
) -> RpcResponse {
    debug!(action = request.action(), "rpc received");
    match request {
        RpcRequest::HealthCheck { sender } => {
            let local = match memberlist.get_local_member() {
                Ok(local) => local,
                Err(e) => return RpcResponse::failure(e.to_string()),
            };
            if local.status() == MemberStatus::Unconfigured {
                return RpcResponse::failure("node is not configured to answer health checks");
            }
            debug!(sender = %sender, "health check acknowledged");
            local.touch_last_response();
            RpcResponse::ok_with_status(local.status())
        }
        RpcRequest::Promote { member } => match memberlist.promote_member(member).await {
            Ok(()) => RpcResponse::ok(),
            Err(e) => RpcResponse::failure(e.to_string()),
        },
        RpcRequest::MakePassive { member } => match memberlist.get_member_by_hostname(member) {
            Ok(target) => match target.make_passive().await {
                Ok(()) => RpcResponse::ok(),
                Err(e) => RpcResponse::failure(e.to_string()),
            },
            Err(e) => RpcResponse::failure(e.to_string()),
        },
        RpcRequest::BringUpIp { iface, ips } => {
            match registry.network().bring_up_ips(iface, ips).await {
                Ok(()) => RpcResponse::ok(),
                Err(e) => RpcResponse::failure(e.to_string()),
            }
        }
        RpcRequest::BringDownIp { iface, ips } => {
            match registry.network().bring_down_ips(iface, ips).await {
                Ok(()) => RpcResponse::ok(),
                Err(e) => RpcResponse::failure(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::BackendHooks;
    use ripcord_cluster::ClusterContext;
    use ripcord_common::{ClusterConfig, NodeConfig, TimingConfig};
    use ripcord_net::{Connector, TcpConnector};
    use std::collections::HashMap;

    fn test_config(local: &str) -> ClusterConfig {
        ClusterConfig {
            local_hostname: local.to_string(),
            nodes: vec![
                NodeConfig {
                    hostname: "node-a".to_string(),
                    address: "127.0.0.1:7331".to_string(),
                },
                NodeConfig {
                    hostname: "node-b".to_string(),
                    address: "127.0.0.1:7332".to_string(),
                },
            ],
            groups: HashMap::new(),
            interfaces: HashMap::new(),
            timing: TimingConfig::default(),
            network_backend: "noop".to_string(),
            health_check_probes: Vec::new(),
        }
    }

    fn test_memberlist(local: &str) -> (Arc<Memberlist>, Arc<BackendRegistry>) {
        let config = test_config(local);
        let registry = Arc::new(BackendRegistry::from_config("noop", &[]).unwrap());
        let hooks = Arc::new(BackendHooks::new(registry.clone(), config.clone()));
        let context = ClusterContext::new(config, Arc::new(TcpConnector), hooks, Vec::new());
        let memberlist = Arc::new(Memberlist::from_config(context).unwrap());
        (memberlist, registry)
    }

    #[tokio::test]
    async fn test_health_check_updates_last_response() {
        let (memberlist, registry) = test_memberlist("node-a");

        let response = dispatch(
            &RpcRequest::HealthCheck {
                sender: "node-b".to_string(),
            },
            &memberlist,
            &registry,
        )
        .await;

        assert!(response.success);
        assert_eq!(response.status, Some(MemberStatus::Passive));
        let local = memberlist.get_local_member().unwrap();
        assert!(local.health_snapshot().last_response.is_some());
    }

    #[tokio::test]
    async fn test_health_check_refused_while_unconfigured() {
        let config = test_config("node-a");
        let registry = Arc::new(BackendRegistry::from_config("noop", &[]).unwrap());
        let hooks = Arc::new(BackendHooks::new(registry.clone(), config.clone()));
        let context = ClusterContext::new(config, Arc::new(TcpConnector), hooks, Vec::new());
        // Membership populated but never configured.
        let memberlist = Arc::new(Memberlist::new(context));
        memberlist.add_member("node-a", "127.0.0.1:7331");

        let response = dispatch(
            &RpcRequest::HealthCheck {
                sender: "node-b".to_string(),
            },
            &memberlist,
            &registry,
        )
        .await;

        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_promote_makes_local_member_active() {
        let (memberlist, registry) = test_memberlist("node-a");

        let response = dispatch(
            &RpcRequest::Promote {
                member: "node-a".to_string(),
            },
            &memberlist,
            &registry,
        )
        .await;

        assert!(response.success);
        assert_eq!(
            memberlist.get_local_member().unwrap().status(),
            MemberStatus::Active
        );
    }

    #[tokio::test]
    async fn test_promote_unknown_member_fails() {
        let (memberlist, registry) = test_memberlist("node-a");

        let response = dispatch(
            &RpcRequest::Promote {
                member: "node-z".to_string(),
            },
            &memberlist,
            &registry,
        )
        .await;

        assert!(!response.success);
        assert!(response.message.contains("node-z"));
    }

    #[tokio::test]
    async fn test_bring_up_ip_uses_network_backend() {
        let (memberlist, registry) = test_memberlist("node-a");

        let response = dispatch(
            &RpcRequest::BringUpIp {
                iface: "eth0".to_string(),
                ips: vec!["10.0.0.5/24".to_string()],
            },
            &memberlist,
            &registry,
        )
        .await;

        assert!(response.success);
    }

    #[tokio::test]
    async fn test_rpc_round_trip_over_tcp() {
        let (memberlist, registry) = test_memberlist("node-a");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve_on(listener, memberlist.clone(), registry));

        let connector = TcpConnector;
        let mut transport = connector.connect(&address, "node-a").await.unwrap();

        let response = transport
            .send(&RpcRequest::HealthCheck {
                sender: "node-b".to_string(),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.status, Some(MemberStatus::Passive));

        let response = transport
            .send(&RpcRequest::Promote {
                member: "node-a".to_string(),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(
            memberlist.get_local_member().unwrap().status(),
            MemberStatus::Active
        );
    }
}
