use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_core::{ProbeKind, ProbeSubmission, Result, Store};

use super::{invalid, Recorder};
use crate::handler::{ProbeHandler, ProbeResult};

/// Addressing facts the agent observes about its own network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetInfoResult {
    pub public_address: String,
    pub local_address: String,
    #[serde(default)]
    pub default_gateway: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
}

pub struct NetInfoHandler {
    recorder: Recorder,
}

impl NetInfoHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            recorder: Recorder::new(store),
        }
    }
}

fn check_ip(submission: &ProbeSubmission, field: &str, value: &str) -> Result<()> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| invalid(submission, format!("{field} is not an IP address: {value}")))
}

#[async_trait]
impl ProbeHandler for NetInfoHandler {
    fn kind(&self) -> ProbeKind {
        ProbeKind::NETINFO
    }

    fn decode(&self, submission: &ProbeSubmission) -> Result<ProbeResult> {
        let info: NetInfoResult = submission.decode_payload()?;
        check_ip(submission, "publicAddress", &info.public_address)?;
        check_ip(submission, "localAddress", &info.local_address)?;
        if let Some(gateway) = &info.default_gateway {
            check_ip(submission, "defaultGateway", gateway)?;
        }
        Ok(ProbeResult::NetInfo(info))
    }

    async fn process(&self, submission: &ProbeSubmission, result: ProbeResult) -> Result<()> {
        let ProbeResult::NetInfo(info) = result else {
            return Err(invalid(submission, "netinfo handler received a foreign result"));
        };
        self.recorder
            .record(submission, submission.created_at, &info)
            .await
    }
}
