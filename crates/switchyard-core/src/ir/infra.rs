//! The infrastructure IR: the shape of the proxy deployment that serves a
//! Gateway.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::IrError;

pub const OWNING_GATEWAY_NAMESPACE_LABEL: &str = "gateway.envoyproxy.io/owning-gateway-namespace";
pub const OWNING_GATEWAY_NAME_LABEL: &str = "gateway.envoyproxy.io/owning-gateway-name";
pub const OWNING_GATEWAY_CLASS_LABEL: &str = "gateway.envoyproxy.io/owning-gatewayclass";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Infra {
    pub proxy: ProxyInfra,
}

impl Infra {
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        let name = name.into();
        Self {
            proxy: ProxyInfra {
                metadata: InfraMetadata {
                    labels,
                    annotations: BTreeMap::new(),
                },
                listeners: vec![],
                name,
                addresses: vec![],
            },
        }
    }

    pub fn validate(&self) -> Result<(), Vec<IrError>> {
        let mut errs = Vec::new();

        if self.proxy.name.is_empty() {
            errs.push(IrError::MissingName);
        }
        for listener in &self.proxy.listeners {
            if listener.ports.is_empty() {
                errs.push(IrError::MissingListenerPorts(listener.name.clone()));
            }
            for port in &listener.ports {
                if port.name.is_empty() {
                    errs.push(IrError::MissingName);
                }
                if port.service_port == 0 || port.container_port < 1024 {
                    errs.push(IrError::InvalidPort);
                }
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    /// Add a port to the proxy listener unless one with the same container
    /// port and L4 protocol already exists. The proxy only ever has a single
    /// listener, created with its first port.
    pub fn add_port(&mut self, port: ListenerPort) {
        if self.proxy.listeners.is_empty() {
            self.proxy.listeners.push(ProxyListener {
                name: self.proxy.name.clone(),
                address: None,
                ports: vec![],
            });
        }
        let listener = &mut self.proxy.listeners[0];

        let exists = listener.ports.iter().any(|p| {
            p.container_port == port.container_port
                && p.protocol.l4_protocol() == port.protocol.l4_protocol()
        });
        if !exists {
            listener.ports.push(port);
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfra {
    pub metadata: InfraMetadata,

    /// Also the key of this Infra in the output map.
    pub name: String,

    pub listeners: Vec<ProxyListener>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfraMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyListener {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    pub ports: Vec<ListenerPort>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerPort {
    pub name: String,
    pub protocol: InfraProtocol,
    pub service_port: u32,
    pub container_port: u32,
}

impl ListenerPort {
    pub fn new(protocol: InfraProtocol, service_port: u32, container_port: u32) -> Self {
        Self {
            name: format!("{}-{service_port}", protocol.as_str()).to_lowercase(),
            protocol,
            service_port,
            container_port,
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InfraProtocol {
    #[default]
    HTTP,
    HTTPS,
    TLS,
    TCP,
    UDP,
}

impl InfraProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfraProtocol::HTTP => "HTTP",
            InfraProtocol::HTTPS => "HTTPS",
            InfraProtocol::TLS => "TLS",
            InfraProtocol::TCP => "TCP",
            InfraProtocol::UDP => "UDP",
        }
    }

    /// The transport protocol the proxy's Service needs to expose.
    pub fn l4_protocol(&self) -> &'static str {
        match self {
            InfraProtocol::UDP => "UDP",
            _ => "TCP",
        }
    }
}
