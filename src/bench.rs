//! The sustained-throughput measurement loop.
//!
//! The harness drives one session as hard as the configured mix and interval
//! allow, for a bounded wall-clock duration. Individual operation failures
//! are counted, never fatal: a permanently dead link showing up as 100%
//! failures is itself a valid measurement.

use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::modbus::{Connector, Session};

/// Which operations each loop iteration issues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Read,
    Write,
    #[serde(alias = "read-write")]
    ReadWrite,
}

impl Mode {
    pub fn includes_reads(self) -> bool {
        matches!(self, Mode::Read | Mode::ReadWrite)
    }

    pub fn includes_writes(self) -> bool {
        matches!(self, Mode::Write | Mode::ReadWrite)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Read => "read",
            Mode::Write => "write",
            Mode::ReadWrite => "read+write",
        })
    }
}

/// Validated parameters for one measurement run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BenchParts")]
pub struct BenchParams {
    mode: Mode,
    start_address: u16,
    count: u16,
    duration: Duration,
    interval: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct BenchParts {
    #[serde(default)]
    mode: Mode,

    #[serde(alias = "register", default)]
    start_address: u16,

    #[serde(default = "default_count")]
    count: u16,

    #[serde(with = "humantime_serde", default = "default_duration")]
    duration: Duration,

    #[serde(with = "humantime_serde", default)]
    interval: Duration,
}

fn default_count() -> u16 {
    10
}

fn default_duration() -> Duration {
    Duration::from_secs(10)
}

impl TryFrom<BenchParts> for BenchParams {
    type Error = ConfigError;

    fn try_from(parts: BenchParts) -> Result<Self, ConfigError> {
        Self::new(
            parts.mode,
            parts.start_address,
            parts.count,
            parts.duration,
            parts.interval,
        )
    }
}

impl BenchParams {
    pub fn new(
        mode: Mode,
        start_address: u16,
        count: u16,
        duration: Duration,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::new("count", "must be positive"));
        }
        if duration.is_zero() {
            return Err(ConfigError::new("duration", "must be positive"));
        }
        Ok(Self {
            mode,
            start_address,
            count,
            duration,
            interval,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Registers transferred per operation.
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Counters accumulated over one run. Every operation attempt lands in
/// exactly one of the three counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub read_ok: u64,
    pub write_ok: u64,
    pub failures: u64,
    /// Actual wall time of the loop, measured on a monotonic clock; at least
    /// the nominal duration, plus however far the last iteration overshot.
    pub elapsed: Duration,
}

impl RunStats {
    pub fn total_ok(&self) -> u64 {
        self.read_ok + self.write_ok
    }

    pub fn attempts(&self) -> u64 {
        self.total_ok() + self.failures
    }
}

/// Runs the measurement loop until the deadline passes.
pub async fn run<C: Connector>(session: &mut Session<C>, params: &BenchParams) -> RunStats {
    let mut read_buf = vec![0u16; params.count as usize];
    // Fixed i+1 fill so every write puts the same, recognizable words on the
    // wire regardless of what reads happened in between.
    let write_buf: Vec<u16> = (1..=params.count).collect();

    let mut stats = RunStats::default();
    let started = Instant::now();
    let deadline = started + params.duration;

    while Instant::now() < deadline {
        if params.mode.includes_reads() {
            match session
                .read_holding_registers(params.start_address, &mut read_buf)
                .await
            {
                Ok(()) => stats.read_ok += 1,
                Err(error) => {
                    debug!(%error, "read failed");
                    stats.failures += 1;
                }
            }
        }

        if params.mode.includes_writes() {
            match session
                .write_registers(params.start_address, &write_buf)
                .await
            {
                Ok(()) => stats.write_ok += 1,
                Err(error) => {
                    debug!(%error, "write failed");
                    stats.failures += 1;
                }
            }
        }

        if !params.interval.is_zero() {
            tokio::time::sleep(params.interval).await;
        }
    }

    stats.elapsed = started.elapsed();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::session::testing::FakeConnector;
    use pretty_assertions::assert_eq;

    fn params(mode: Mode, count: u16, duration_ms: u64, interval_ms: u64) -> BenchParams {
        BenchParams::new(
            mode,
            0,
            count,
            Duration::from_millis(duration_ms),
            Duration::from_millis(interval_ms),
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_count_and_zero_duration() {
        let err =
            BenchParams::new(Mode::Read, 0, 0, Duration::from_secs(1), Duration::ZERO)
                .unwrap_err();
        assert_eq!(err.field, "count");

        let err = BenchParams::new(Mode::Read, 0, 10, Duration::ZERO, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.field, "duration");
    }

    #[test]
    fn parses_run_settings_with_defaults() {
        let params = serde_json::from_value::<BenchParams>(serde_json::json!({}))
            .unwrap();
        assert_eq!(params.mode(), Mode::Read);
        assert_eq!(params.start_address(), 0);
        assert_eq!(params.count(), 10);
        assert_eq!(params.duration(), Duration::from_secs(10));
        assert_eq!(params.interval(), Duration::ZERO);

        let params = serde_json::from_value::<BenchParams>(serde_json::json!({
            "mode": "read-write",
            "register": 100,
            "count": 25,
            "duration": "30s",
            "interval": "50ms",
        }))
        .unwrap();
        assert_eq!(params.mode(), Mode::ReadWrite);
        assert_eq!(params.start_address(), 100);
        assert_eq!(params.count(), 25);
        assert_eq!(params.duration(), Duration::from_secs(30));
        assert_eq!(params.interval(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn read_write_mix_stays_balanced() {
        let connector = FakeConnector::default();
        let mut session = Session::new(connector.clone());

        let stats = run(&mut session, &params(Mode::ReadWrite, 10, 60, 2)).await;

        assert!(stats.attempts() > 0);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.read_ok, stats.write_ok);
        assert!(stats.elapsed >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn failures_are_counted_not_fatal() {
        let connector = FakeConnector::default();
        connector.script().failed_ops = usize::MAX;
        let mut session = Session::new(connector.clone());

        let stats = run(&mut session, &params(Mode::Read, 10, 40, 1)).await;

        assert!(stats.failures > 0);
        assert_eq!(stats.read_ok, 0);
        assert_eq!(stats.write_ok, 0);
        assert_eq!(stats.attempts(), stats.failures);
    }

    #[tokio::test]
    async fn write_pattern_is_deterministic() {
        let connector = FakeConnector::default();
        let mut session = Session::new(connector.clone());

        let stats = run(&mut session, &params(Mode::Write, 4, 30, 5)).await;
        assert!(stats.write_ok > 0);

        let script = connector.script();
        for (addr, words) in script.register_writes.iter() {
            assert_eq!(*addr, 0);
            assert_eq!(words, &vec![1, 2, 3, 4]);
        }
    }

    #[tokio::test]
    async fn interval_zero_runs_strictly_faster() {
        let connector = FakeConnector::default();

        let mut session = Session::new(connector.clone());
        let max_rate = run(&mut session, &params(Mode::Read, 10, 80, 0)).await;

        let mut session = Session::new(connector.clone());
        let throttled = run(&mut session, &params(Mode::Read, 10, 80, 20)).await;

        assert!(
            max_rate.total_ok() > throttled.total_ok(),
            "expected {} > {}",
            max_rate.total_ok(),
            throttled.total_ok()
        );
    }
}
