//! Topology discovery from seed nodes
//!
//! Seeds are tried in order. The first one that answers wins; CLUSTER NODES
//! is preferred and the INFO replication view is used when the server runs
//! without cluster support.

use tracing::{debug, info, warn};

use super::topology::ClusterTopology;
use crate::client::{ConnectionFactory, ControlPlane, ControlPlaneExt, RetryPolicy};
use crate::config::ServerAddress;
use crate::utils::{AssessError, ClusterError, ProtocolError, Result};

/// Server replies meaning "this is not a cluster node"
fn is_cluster_disabled(err: &AssessError) -> bool {
    match err {
        AssessError::Protocol(ProtocolError::Server(msg)) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("cluster support disabled")
                || msg.contains("unknown command")
                || msg.contains("unknown subcommand")
        }
        _ => false,
    }
}

/// Discover topology through an open connection to `seed`
pub fn discover_from<C: ControlPlane + ?Sized>(
    conn: &mut C,
    seed: &ServerAddress,
) -> Result<ClusterTopology> {
    match conn.cluster_nodes() {
        Ok(text) => Ok(ClusterTopology::from_cluster_nodes(&text, &seed.host)?),
        Err(e) if is_cluster_disabled(&e) => {
            debug!("{} is not in cluster mode, reading replication info", seed);
            let info = conn.info("replication")?;
            Ok(ClusterTopology::from_replication_info(seed, &info))
        }
        Err(e) => Err(e),
    }
}

/// Discover topology from the first reachable seed
pub fn discover_topology(
    factory: &ConnectionFactory,
    seeds: &[ServerAddress],
    retry: &RetryPolicy,
) -> Result<ClusterTopology> {
    let mut failures = Vec::new();

    for seed in seeds {
        let label = format!("discover {}", seed);
        let result = retry.run(&label, |_| {
            let mut conn = factory.create(&seed.host, seed.port)?;
            discover_from(&mut conn, seed)
        });

        match result {
            Ok(topology) => {
                info!(
                    "Discovered {:?} topology via {}: {} primaries, {} nodes",
                    topology.mode,
                    seed,
                    topology.num_primaries(),
                    topology.num_nodes()
                );
                return Ok(topology);
            }
            Err(e) => {
                warn!("Seed {} failed: {}", seed, e);
                failures.push(format!("{}: {}", seed, e));
            }
        }
    }

    Err(ClusterError::NoReachableSeed(failures.join("; ")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::control_plane::tests::{bulk, MockControlPlane};
    use crate::cluster::TopologyMode;
    use crate::utils::RespValue;
    use std::time::Duration;

    #[test]
    fn test_discover_cluster() {
        let mut mock = MockControlPlane::new(vec![bulk(
            "abc :7000@17000 myself,master - 0 0 1 connected 0-16383\n",
        )]);
        let seed = ServerAddress::new("10.1.1.1", 7000);
        let topology = discover_from(&mut mock, &seed).unwrap();

        assert_eq!(topology.mode, TopologyMode::Cluster);
        assert_eq!(topology.nodes[0].address(), "10.1.1.1:7000");
    }

    #[test]
    fn test_discover_falls_back_to_standalone() {
        let mut mock = MockControlPlane::new(vec![
            RespValue::Error("ERR This instance has cluster support disabled".to_string()),
            bulk("# Replication\r\nrole:master\r\nconnected_slaves:0\r\n"),
        ]);
        let seed = ServerAddress::new("localhost", 6379);
        let topology = discover_from(&mut mock, &seed).unwrap();

        assert_eq!(topology.mode, TopologyMode::Standalone);
        assert_eq!(topology.num_nodes(), 1);
        assert_eq!(mock.commands[1], vec!["INFO", "replication"]);
    }

    #[test]
    fn test_other_server_errors_propagate() {
        let mut mock = MockControlPlane::new(vec![RespValue::Error(
            "NOAUTH Authentication required.".to_string(),
        )]);
        let seed = ServerAddress::new("localhost", 6379);
        assert!(discover_from(&mut mock, &seed).is_err());
        assert_eq!(mock.commands.len(), 1);
    }

    #[test]
    fn test_no_reachable_seed() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let factory = ConnectionFactory {
            connect_timeout: Duration::from_millis(200),
            io_timeout: Duration::from_millis(200),
            tls_config: None,
            auth_password: None,
            auth_username: None,
        };
        let seeds = vec![ServerAddress::new("127.0.0.1", port)];
        let err = discover_topology(&factory, &seeds, &RetryPolicy::none()).unwrap_err();
        assert!(matches!(
            err,
            AssessError::Cluster(ClusterError::NoReachableSeed(_))
        ));
    }
}
