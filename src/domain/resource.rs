// Copyright (c) 2025 - Cowboy AI, Inc.
//! Seed Data and v2 Catalog Shapes
//!
//! Clusters may carry config entries and typed resources to create once the
//! servers are up, plus forward-declared v2 services. Payloads are opaque
//! JSON; only identity and tenancy are interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::{namespace_or_default, partition_or_default, WorkloadId};
use super::resource_type::ResourceType;
use super::workload::Protocol;

/// Tenancy of a typed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenancy {
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_name: String,
}

impl Tenancy {
    pub fn new(partition: &str, namespace: &str) -> Self {
        Self {
            partition: partition_or_default(partition).to_string(),
            namespace: namespace_or_default(namespace).to_string(),
            peer_name: String::new(),
        }
    }

    /// Only local tenancy may be written from here
    pub fn is_local(&self) -> bool {
        matches!(self.peer_name.as_str(), "" | "local")
    }

    pub fn normalize(&mut self) {
        self.partition = partition_or_default(&self.partition).to_string();
        self.namespace = namespace_or_default(&self.namespace).to_string();
    }
}

impl From<&WorkloadId> for Tenancy {
    fn from(id: &WorkloadId) -> Self {
        Tenancy::new(&id.partition, &id.namespace)
    }
}

/// Identity of a typed resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub tenancy: Tenancy,
}

impl ResourceId {
    pub fn new(resource_type: ResourceType, name: impl Into<String>, tenancy: Tenancy) -> Self {
        Self {
            name: name.into(),
            resource_type,
            tenancy,
        }
    }
}

/// A typed resource with an opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Deleting the owner garbage-collects this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ResourceId>,
    #[serde(default)]
    pub data: Value,
}

impl Resource {
    pub fn new(id: ResourceId, data: Value) -> Self {
        Self {
            id,
            owner: None,
            data,
        }
    }

    pub fn owned_by(mut self, owner: ResourceId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// A config entry to seed at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Kind-specific fields, passed through verbatim
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ConfigEntry {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            partition: String::new(),
            namespace: String::new(),
            body: Map::new(),
        }
    }
}

/// Declared tenancy of a cluster: a partition and its namespaces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// A port of a v2 service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub target_port: String,
    #[serde(default)]
    pub protocol: Protocol,
    /// Allocated at compile when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_port: Option<u16>,
}

/// A v2 catalog service, declared or inferred from workloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2Service {
    pub id: WorkloadId,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    /// Workload-instance names selected by this service. Compiler owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workloads: Option<Vec<String>>,
    /// Compiler owned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_ips: Vec<String>,
}

impl V2Service {
    pub fn new(id: WorkloadId) -> Self {
        Self {
            id,
            ports: Vec::new(),
            workloads: None,
            virtual_ips: Vec::new(),
        }
    }

    pub fn with_port(mut self, target_port: impl Into<String>, protocol: Protocol) -> Self {
        self.ports.push(ServicePort {
            target_port: target_port.into(),
            protocol,
            virtual_port: None,
        });
        self
    }

    pub(crate) fn select(&mut self, workload: String) {
        self.workloads.get_or_insert_with(Vec::new).push(workload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_entry_keeps_body() {
        let entry: ConfigEntry = serde_json::from_value(json!({
            "kind": "service-defaults",
            "name": "ping",
            "namespace": "ns1",
            "protocol": "http"
        }))
        .unwrap();
        assert_eq!(entry.namespace, "ns1");
        assert_eq!(entry.body.get("protocol"), Some(&json!("http")));
    }

    #[test]
    fn test_tenancy_locality() {
        let mut t = Tenancy::default();
        assert!(t.is_local());
        t.peer_name = "local".into();
        assert!(t.is_local());
        t.peer_name = "peer-dc2-default".into();
        assert!(!t.is_local());
        t.normalize();
        assert_eq!(t.partition, "default");
    }

    #[test]
    fn test_resource_round_trip() {
        let res: Resource = serde_json::from_value(json!({
            "id": {
                "name": "api",
                "type": {"group": "auth", "group_version": "v2beta1", "kind": "TrafficPermissions"}
            },
            "data": {"action": "allow"}
        }))
        .unwrap();
        assert_eq!(res.id.tenancy, Tenancy::default());
        assert_eq!(res.data["action"], "allow");
        assert!(res.owner.is_none());
        assert!(serde_json::to_value(&res).unwrap().get("owner").is_none());
    }

    #[test]
    fn test_owned_resource_serializes_owner() {
        let owner = ResourceId::new(ResourceType::workload(), "ping-dp1", Tenancy::default());
        let res = Resource::new(
            ResourceId::new(ResourceType::health_status(), "ping-dp1-check-0", Tenancy::default()),
            json!({}),
        )
        .owned_by(owner.clone());
        let value = serde_json::to_value(&res).unwrap();
        assert_eq!(value["owner"]["name"], "ping-dp1");
        let back: Resource = serde_json::from_value(value).unwrap();
        assert_eq!(back.owner, Some(owner));
    }
}
