// Copyright (c) 2025 - Cowboy AI, Inc.
//! Addressing table of a running topology

use std::fmt::Write;
use tracing::info;

use super::Sprawl;
use crate::domain::{Node, Topology};

const HEADER: [&str; 7] = ["CLUSTER", "NODE", "KIND", "LOCAL", "PUBLIC", "PORTS", "WORKLOADS"];

impl Sprawl {
    /// Every node of every cluster with its addresses, exposed ports and
    /// workloads, one row per node.
    pub fn details(&self) -> String {
        render(&self.topology)
    }

    pub(super) fn log_details(&self) {
        info!("topology details\n{}", self.details());
    }
}

fn render(topology: &Topology) -> String {
    let mut rows: Vec<[String; 7]> = vec![HEADER.map(str::to_string)];
    for cluster in topology.sorted_clusters() {
        for node in cluster.sorted_nodes() {
            rows.push(row(&cluster.name, node));
        }
    }

    let mut widths = [0usize; 7];
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    for row in &rows {
        let mut line = String::new();
        for (cell, w) in row.iter().zip(widths) {
            let _ = write!(line, "{cell:<w$}  ");
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn row(cluster: &str, node: &Node) -> [String; 7] {
    let kind = if node.disabled {
        format!("{} (disabled)", node.kind.as_str())
    } else {
        node.kind.as_str().to_string()
    };
    let ports = node
        .used_ports()
        .iter()
        .filter(|(_, exposed)| **exposed > 0)
        .map(|(internal, exposed)| format!("{exposed}->{internal}"))
        .collect::<Vec<_>>()
        .join(",");
    let workloads = node
        .sorted_workloads()
        .iter()
        .map(|w| match w.exposed_envoy_admin_port {
            Some(admin) => format!("{} (admin {admin})", w.id),
            None => w.id.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",");

    [
        cluster.to_string(),
        node.id().to_string(),
        kind,
        node.local_address().unwrap_or("-").to_string(),
        node.public_address().unwrap_or("-").to_string(),
        if ports.is_empty() { "-".to_string() } else { ports },
        if workloads.is_empty() { "-".to_string() } else { workloads },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Cluster, Images, NodeKind, Workload, WorkloadId};
    use std::collections::BTreeMap;

    fn topology() -> Topology {
        let mut server = Node::new(NodeKind::Server, "s1");
        let mut addr = Address::on("dc1");
        addr.ip_address = Some("10.0.1.11".into());
        server.addresses.push(addr);

        let mut client = Node::new(NodeKind::Client, "c1");
        client.disabled = true;
        client
            .workloads
            .push(Workload::new(WorkloadId::new("ping", "", ""), "pinger", 8080));

        let mut cluster = Cluster::new("dc1");
        cluster.nodes = vec![server, client];

        Topology {
            id: "abc".into(),
            images: Images::defaults(),
            networks: BTreeMap::new(),
            clusters: BTreeMap::from([("dc1".to_string(), cluster)]),
            peerings: Vec::new(),
            network_areas: Vec::new(),
        }
    }

    #[test]
    fn test_details_one_row_per_node() {
        let table = render(&topology());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CLUSTER"));
        assert!(lines[1].contains("10.0.1.11"));
        assert!(lines[2].contains("client (disabled)"));
        assert!(lines[2].contains("ping"));
    }
}
