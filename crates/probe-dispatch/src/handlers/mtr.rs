use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{ProbeKind, ProbeSubmission, Result, Store};

use super::{check_non_negative, check_percent, invalid, Recorder};
use crate::handler::{ProbeHandler, ProbeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtrHop {
    pub ttl: u8,
    /// `None` when the hop never answered.
    #[serde(default)]
    pub host: Option<String>,
    pub loss: f64,
    pub avg_rtt: f64,
}

/// A traceroute with per-hop statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtrResult {
    pub start_timestamp: DateTime<Utc>,
    pub stop_timestamp: DateTime<Utc>,
    pub hops: Vec<MtrHop>,
}

pub struct MtrHandler {
    recorder: Recorder,
}

impl MtrHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            recorder: Recorder::new(store),
        }
    }

    fn validate(submission: &ProbeSubmission, mtr: &MtrResult) -> Result<()> {
        if mtr.hops.is_empty() {
            return Err(invalid(submission, "trace has no hops"));
        }
        if mtr.start_timestamp > mtr.stop_timestamp {
            return Err(invalid(submission, "run stops before it starts"));
        }

        let mut previous_ttl = None;
        for hop in &mtr.hops {
            if previous_ttl.is_some_and(|ttl| hop.ttl <= ttl) {
                return Err(invalid(
                    submission,
                    format!("hop ttl {} is out of order", hop.ttl),
                ));
            }
            previous_ttl = Some(hop.ttl);
            check_percent(submission, "loss", hop.loss)?;
            check_non_negative(submission, "avgRtt", hop.avg_rtt)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProbeHandler for MtrHandler {
    fn kind(&self) -> ProbeKind {
        ProbeKind::MTR
    }

    fn decode(&self, submission: &ProbeSubmission) -> Result<ProbeResult> {
        let mtr: MtrResult = submission.decode_payload()?;
        Self::validate(submission, &mtr)?;
        Ok(ProbeResult::Mtr(mtr))
    }

    async fn process(&self, submission: &ProbeSubmission, result: ProbeResult) -> Result<()> {
        let ProbeResult::Mtr(mtr) = result else {
            return Err(invalid(submission, "mtr handler received a foreign result"));
        };
        self.recorder
            .record(submission, mtr.stop_timestamp, &mtr)
            .await
    }
}
