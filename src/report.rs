//! Turns raw run counters into throughput figures.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::bench::RunStats;

/// Each Modbus register is one 16-bit word.
const BYTES_PER_REGISTER: f64 = 2.0;

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub read_ok: u64,
    pub write_ok: u64,
    pub failures: u64,
    pub ops_per_second: f64,
    pub registers_per_second: f64,
    pub bytes_per_second: f64,
}

impl Report {
    /// Derives throughput from the accumulated counters and the number of
    /// registers each operation transferred.
    pub fn from_stats(stats: &RunStats, registers_per_op: u16) -> Self {
        let secs = stats.elapsed.as_secs_f64();
        let total_ok = stats.total_ok() as f64;

        let (ops_per_second, registers_per_second) = if secs > 0.0 {
            let ops = total_ok / secs;
            (ops, ops * f64::from(registers_per_op))
        } else {
            (0.0, 0.0)
        };

        Self {
            elapsed: stats.elapsed,
            read_ok: stats.read_ok,
            write_ok: stats.write_ok,
            failures: stats.failures,
            ops_per_second,
            registers_per_second,
            bytes_per_second: registers_per_second * BYTES_PER_REGISTER,
        }
    }

    pub fn total_ok(&self) -> u64 {
        self.read_ok + self.write_ok
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Test Results:")?;
        writeln!(
            f,
            "  Test Duration: {:.2} seconds",
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "  Total Operations: {} ({} reads, {} writes)",
            self.total_ok(),
            self.read_ok,
            self.write_ok
        )?;
        writeln!(f, "  Failed Operations: {}", self.failures)?;
        writeln!(
            f,
            "  Operations per Second: {:.2} ops/sec",
            self.ops_per_second
        )?;
        writeln!(
            f,
            "  Registers per Second: {:.2} registers/sec",
            self.registers_per_second
        )?;
        write!(
            f,
            "  Data Throughput: {:.2} KB/sec",
            self.bytes_per_second / 1024.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(read_ok: u64, write_ok: u64, failures: u64, elapsed: Duration) -> RunStats {
        RunStats {
            read_ok,
            write_ok,
            failures,
            elapsed,
        }
    }

    #[test]
    fn derives_throughput_from_counters() {
        let report = Report::from_stats(&stats(60, 40, 5, Duration::from_secs(2)), 10);

        assert_eq!(report.total_ok(), 100);
        assert_eq!(report.ops_per_second, 50.0);
        assert_eq!(report.registers_per_second, 500.0);
        assert_eq!(report.bytes_per_second, 1000.0);
        assert_eq!(report.failures, 5);
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let report = Report::from_stats(&stats(1, 1, 0, Duration::ZERO), 10);
        assert_eq!(report.ops_per_second, 0.0);
        assert_eq!(report.registers_per_second, 0.0);
        assert_eq!(report.bytes_per_second, 0.0);
    }

    #[test]
    fn renders_the_result_block() {
        let report = Report::from_stats(&stats(60, 40, 5, Duration::from_secs(2)), 10);
        let text = report.to_string();

        assert!(text.contains("Total Operations: 100 (60 reads, 40 writes)"));
        assert!(text.contains("Failed Operations: 5"));
        assert!(text.contains("Operations per Second: 50.00 ops/sec"));
        assert!(text.contains("Data Throughput: 0.98 KB/sec"));
    }
}
