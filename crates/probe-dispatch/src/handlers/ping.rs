use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{ProbeKind, ProbeSubmission, Result, Store};

use super::{check_non_negative, check_percent, invalid, Recorder};
use crate::handler::{ProbeHandler, ProbeResult};

/// Summary of one ICMP ping run. RTTs are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub packet_loss: f64,
    pub min_rtt: f64,
    pub avg_rtt: f64,
    pub max_rtt: f64,
    #[serde(default)]
    pub std_dev_rtt: f64,
    pub start_timestamp: DateTime<Utc>,
    pub stop_timestamp: DateTime<Utc>,
}

pub struct PingHandler {
    recorder: Recorder,
}

impl PingHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            recorder: Recorder::new(store),
        }
    }

    fn validate(submission: &ProbeSubmission, ping: &PingResult) -> Result<()> {
        if ping.packets_received > ping.packets_sent {
            return Err(invalid(
                submission,
                format!(
                    "received {} packets but only sent {}",
                    ping.packets_received, ping.packets_sent
                ),
            ));
        }
        check_percent(submission, "packetLoss", ping.packet_loss)?;
        for (field, value) in [
            ("minRtt", ping.min_rtt),
            ("avgRtt", ping.avg_rtt),
            ("maxRtt", ping.max_rtt),
            ("stdDevRtt", ping.std_dev_rtt),
        ] {
            check_non_negative(submission, field, value)?;
        }
        if ping.min_rtt > ping.avg_rtt || ping.avg_rtt > ping.max_rtt {
            return Err(invalid(submission, "expected minRtt <= avgRtt <= maxRtt"));
        }
        if ping.start_timestamp > ping.stop_timestamp {
            return Err(invalid(submission, "run stops before it starts"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProbeHandler for PingHandler {
    fn kind(&self) -> ProbeKind {
        ProbeKind::PING
    }

    fn decode(&self, submission: &ProbeSubmission) -> Result<ProbeResult> {
        let ping: PingResult = submission.decode_payload()?;
        Self::validate(submission, &ping)?;
        Ok(ProbeResult::Ping(ping))
    }

    async fn process(&self, submission: &ProbeSubmission, result: ProbeResult) -> Result<()> {
        let ProbeResult::Ping(ping) = result else {
            return Err(invalid(submission, "ping handler received a foreign result"));
        };
        self.recorder
            .record(submission, ping.stop_timestamp, &ping)
            .await
    }
}
