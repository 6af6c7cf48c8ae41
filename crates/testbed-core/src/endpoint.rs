//! Service coordinates handed to backing-service adapters.

use crate::Result;
use crate::toxic::Toxic;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Fault-injection controls of a proxied mapping.
#[async_trait]
pub trait FaultControls: Send + Sync {
    /// Add a named toxic. Re-adding an existing name is provider-defined.
    async fn add_toxic(&self, toxic: Toxic) -> Result<()>;

    /// Remove a previously added toxic.
    async fn remove_toxic(&self, name: &str) -> Result<()>;

    /// Block (`false`) or restore (`true`) all traffic, keeping toxics.
    async fn set_enabled(&self, enabled: bool) -> Result<()>;
}

/// How to reach a backing service.
///
/// `Proxied` endpoints were produced by a proxy gateway: the port is the
/// gateway's listening port and the controls drive its toxics.
#[derive(Clone)]
pub enum ServiceEndpoint {
    Direct {
        host: String,
        port: u16,
    },
    Proxied {
        host: String,
        port: u16,
        controls: Arc<dyn FaultControls>,
    },
}

impl ServiceEndpoint {
    pub fn direct(host: impl Into<String>, port: u16) -> Self {
        ServiceEndpoint::Direct {
            host: host.into(),
            port,
        }
    }

    pub fn proxied(host: impl Into<String>, port: u16, controls: Arc<dyn FaultControls>) -> Self {
        ServiceEndpoint::Proxied {
            host: host.into(),
            port,
            controls,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            ServiceEndpoint::Direct { host, .. } | ServiceEndpoint::Proxied { host, .. } => host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            ServiceEndpoint::Direct { port, .. } | ServiceEndpoint::Proxied { port, .. } => *port,
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self, ServiceEndpoint::Proxied { .. })
    }

    pub fn controls(&self) -> Option<&Arc<dyn FaultControls>> {
        match self {
            ServiceEndpoint::Proxied { controls, .. } => Some(controls),
            ServiceEndpoint::Direct { .. } => None,
        }
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_proxied() { "Proxied" } else { "Direct" };
        f.debug_struct(mode)
            .field("host", &self.host())
            .field("port", &self.port())
            .finish()
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port())
    }
}

/// Equality is by coordinates only.
impl PartialEq for ServiceEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host() == other.host()
            && self.port() == other.port()
            && self.is_proxied() == other.is_proxied()
    }
}

impl Eq for ServiceEndpoint {}
