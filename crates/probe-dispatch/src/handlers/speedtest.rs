use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{ProbeKind, ProbeSubmission, Result, Store};

use super::{check_non_negative, invalid, Recorder};
use crate::handler::{ProbeHandler, ProbeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedtestResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: f64,
    #[serde(default)]
    pub jitter_ms: Option<f64>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    pub tested_at: DateTime<Utc>,
}

pub struct SpeedtestHandler {
    recorder: Recorder,
}

impl SpeedtestHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            recorder: Recorder::new(store),
        }
    }
}

#[async_trait]
impl ProbeHandler for SpeedtestHandler {
    fn kind(&self) -> ProbeKind {
        ProbeKind::SPEEDTEST
    }

    fn decode(&self, submission: &ProbeSubmission) -> Result<ProbeResult> {
        let test: SpeedtestResult = submission.decode_payload()?;
        check_non_negative(submission, "downloadMbps", test.download_mbps)?;
        check_non_negative(submission, "uploadMbps", test.upload_mbps)?;
        check_non_negative(submission, "latencyMs", test.latency_ms)?;
        if let Some(jitter) = test.jitter_ms {
            check_non_negative(submission, "jitterMs", jitter)?;
        }
        Ok(ProbeResult::Speedtest(test))
    }

    async fn process(&self, submission: &ProbeSubmission, result: ProbeResult) -> Result<()> {
        let ProbeResult::Speedtest(test) = result else {
            return Err(invalid(
                submission,
                "speedtest handler received a foreign result",
            ));
        };
        self.recorder.record(submission, test.tested_at, &test).await
    }
}
