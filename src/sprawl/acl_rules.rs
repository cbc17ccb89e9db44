// Copyright (c) 2025 - Cowboy AI, Inc.
//! ACL rule sets written by the orchestrator

use crate::domain::{WorkloadId, DEFAULT_NAMESPACE, DEFAULT_PARTITION};

/// Name of the policy attached to the anonymous token
pub const ANONYMOUS_POLICY: &str = "anonymous";

/// Name of the per-partition cross-namespace catalog read policy
pub const CROSS_NAMESPACE_POLICY: &str = "cross-ns-catalog-read";

/// Template bound to v2 workload tokens
pub const WORKLOAD_IDENTITY_TEMPLATE: &str = "builtin/workload-identity";

/// Broad read access for anonymous requests (DNS, catalog, UI)
pub fn anonymous(enterprise: bool) -> String {
    let read = r#"
node_prefix "" {
  policy = "read"
}
service_prefix "" {
  policy = "read"
}
"#;
    if !enterprise {
        return read.trim_start().to_string();
    }
    format!(
        "partition_prefix \"\" {{\n  namespace_prefix \"\" {{{}  }}\n}}\n",
        indent(read, 4)
    )
}

/// Name of the override policy of one mesh gateway
pub fn mesh_gateway_policy_name(id: &WorkloadId) -> String {
    format!("mesh-gateway--{}", id.acl_string())
}

/// Lets a mesh gateway register itself and watch every service it routes
/// to. Gateways in the default partition also route between partitions.
pub fn mesh_gateway(id: &WorkloadId, enterprise: bool) -> String {
    let own = format!(
        r#"
service "{name}" {{
  policy = "write"
}}
service_prefix "" {{
  policy = "read"
}}
node_prefix "" {{
  policy = "read"
}}
agent_prefix "" {{
  policy = "read"
}}
"#,
        name = id.name
    );

    if !enterprise {
        return format!("{}mesh = \"write\"\n", own.trim_start());
    }

    if id.partition == DEFAULT_PARTITION || id.partition.is_empty() {
        format!(
            "namespace \"{ns}\" {{{body}}}\npartition_prefix \"\" {{\n  namespace_prefix \"\" {{\n    service_prefix \"\" {{\n      policy = \"read\"\n    }}\n  }}\n}}\nmesh = \"write\"\npeering = \"read\"\n",
            ns = DEFAULT_NAMESPACE,
            body = indent(&own, 2),
        )
    } else {
        format!(
            "partition \"{p}\" {{\n  namespace \"{ns}\" {{{body}  }}\n  mesh = \"write\"\n}}\n",
            p = id.partition,
            ns = DEFAULT_NAMESPACE,
            body = indent(&own, 4),
        )
    }
}

/// Catalog read across every namespace of one partition
pub fn cross_namespace_read(partition: &str) -> String {
    format!(
        r#"partition "{partition}" {{
  namespace_prefix "" {{
    node_prefix "" {{
      policy = "read"
    }}
    service_prefix "" {{
      policy = "read"
    }}
  }}
}}
"#
    )
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    let mut out = String::from("\n");
    for line in text.lines().filter(|l| !l.is_empty()) {
        out.push_str(&pad);
        out.push_str(line);
        out.push('\n');
    }
    out
}
