//! The capability every probe kind implements

use async_trait::async_trait;
use vigil_core::{ProbeKind, ProbeSubmission, Result, ServerEntry};

use crate::handlers::{MtrResult, NetInfoResult, PingResult, SpeedtestResult};

/// A decoded, validated payload. One variant per built-in kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    Ping(PingResult),
    Mtr(MtrResult),
    Speedtest(SpeedtestResult),
    SpeedtestServers(Vec<ServerEntry>),
    NetInfo(NetInfoResult),
}

impl ProbeResult {
    pub fn kind(&self) -> ProbeKind {
        match self {
            Self::Ping(_) => ProbeKind::PING,
            Self::Mtr(_) => ProbeKind::MTR,
            Self::Speedtest(_) => ProbeKind::SPEEDTEST,
            Self::SpeedtestServers(_) => ProbeKind::SPEEDTEST_SERVERS,
            Self::NetInfo(_) => ProbeKind::NETINFO,
        }
    }
}

/// Decode-and-validate plus process, bound to one kind.
///
/// `decode` must be free of side effects; the registry only calls `process`
/// with a result `decode` produced for the same submission. `process` may run
/// more than once for the same logical result when agents retry, so any state
/// it mutates must be last-write-wins.
#[async_trait]
pub trait ProbeHandler: Send + Sync + 'static {
    fn kind(&self) -> ProbeKind;

    fn decode(&self, submission: &ProbeSubmission) -> Result<ProbeResult>;

    async fn process(&self, submission: &ProbeSubmission, result: ProbeResult) -> Result<()>;
}
