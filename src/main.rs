use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing::info;

use modbus_bench::bench::{self, BenchParams, Mode};
use modbus_bench::modbus::{Session, TransportDescriptor};
use modbus_bench::report::Report;
use modbus_bench::Result;

#[derive(Parser, Debug)]
#[clap(
    name = "modbus-bench",
    version,
    about = "Throughput test tool for Modbus RTU and TCP devices"
)]
struct Cli {
    /// Use Modbus TCP (the default)
    #[clap(long, conflicts_with = "rtu")]
    tcp: bool,

    /// Use Modbus RTU over a serial line
    #[clap(long)]
    rtu: bool,

    /// TCP server host
    #[clap(short = 'i', long, default_value = "127.0.0.1")]
    host: String,

    /// TCP server port
    #[clap(short = 'p', long, default_value_t = 502)]
    port: u16,

    /// Serial device
    #[clap(short = 'd', long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Serial baud rate
    #[clap(short = 'b', long, default_value_t = 115200)]
    baud: u32,

    /// Serial parity: N(one), E(ven), or O(dd)
    #[clap(long, default_value_t = 'N')]
    parity: char,

    /// Serial data bits (7 or 8)
    #[clap(long, default_value_t = 8)]
    data_bits: u8,

    /// Serial stop bits (1 or 2)
    #[clap(long, default_value_t = 1)]
    stop_bits: u8,

    /// Slave / unit identifier
    #[clap(short = 's', long, default_value_t = 1)]
    slave: u8,

    /// Starting register address
    #[clap(short = 'r', long, default_value_t = 0)]
    register: u16,

    /// Registers per operation
    #[clap(short = 'c', long, default_value_t = 10)]
    count: u16,

    /// Test duration in seconds
    #[clap(short = 't', long, default_value_t = 10)]
    duration: u64,

    /// Operation mix
    #[clap(short = 'm', long, value_enum, default_value_t = Mode::Read)]
    mode: Mode,

    /// Pause between iterations in milliseconds (0 = max speed)
    #[clap(short = 'v', long, default_value_t = 0)]
    interval: u64,

    /// Per-exchange timeout in milliseconds
    #[clap(long, default_value_t = 1000)]
    timeout: u64,

    /// Read connection and run settings from a JSON file instead of flags
    #[clap(long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Print the final report as JSON
    #[clap(long)]
    json: bool,
}

/// File-based equivalent of the command line: one flat JSON object holding
/// both the endpoint description and the run settings.
#[derive(Debug, Deserialize)]
struct RunConfig {
    #[serde(flatten)]
    transport: TransportDescriptor,

    #[serde(flatten)]
    bench: BenchParams,
}

impl Cli {
    fn descriptor(&self) -> Result<TransportDescriptor> {
        let endpoint = if self.tcp || !self.rtu {
            tcp_endpoint(self)?
        } else {
            rtu_endpoint(self)?
        };
        Ok(TransportDescriptor::new(endpoint, self.slave)?)
    }

    fn params(&self) -> Result<BenchParams> {
        Ok(BenchParams::new(
            self.mode,
            self.register,
            self.count,
            Duration::from_secs(self.duration),
            Duration::from_millis(self.interval),
        )?)
    }
}

#[cfg(feature = "rtu")]
fn rtu_endpoint(cli: &Cli) -> Result<modbus_bench::modbus::Endpoint> {
    Ok(modbus_bench::modbus::Endpoint::rtu(
        &cli.device,
        cli.baud,
        cli.parity,
        cli.data_bits,
        cli.stop_bits,
    )?)
}

#[cfg(not(feature = "rtu"))]
fn rtu_endpoint(_cli: &Cli) -> Result<modbus_bench::modbus::Endpoint> {
    Err("this build has no RTU support".into())
}

#[cfg(feature = "tcp")]
fn tcp_endpoint(cli: &Cli) -> Result<modbus_bench::modbus::Endpoint> {
    Ok(modbus_bench::modbus::Endpoint::tcp(&cli.host, cli.port)?)
}

#[cfg(not(feature = "tcp"))]
fn tcp_endpoint(_cli: &Cli) -> Result<modbus_bench::modbus::Endpoint> {
    Err("this build has no TCP support".into())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Cli::parse();

    let (descriptor, params) = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            let config: RunConfig = serde_json::from_reader(file)?;
            (config.transport, config.bench)
        }
        None => (args.descriptor()?, args.params()?),
    };

    info!(
        endpoint = %descriptor.endpoint(),
        unit = descriptor.unit(),
        mode = %params.mode(),
        start_address = params.start_address(),
        count = params.count(),
        duration = ?params.duration(),
        interval = ?params.interval(),
        "starting throughput test"
    );

    let registers_per_op = params.count();
    let mut session =
        Session::new(descriptor).with_timeout(Duration::from_millis(args.timeout));

    // An endpoint that cannot be reached even once is a configuration
    // problem, not a measurement.
    session.connect().await?;
    info!("connected");

    let stats = bench::run(&mut session, &params).await;
    session.disconnect();

    let report = Report::from_stats(&stats, registers_per_op);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(feature = "tcp", feature = "rtu"))]
    fn parses_a_combined_config_file() {
        let config = serde_json::from_value::<RunConfig>(serde_json::json!({
            "proto": "tcp",
            "host": "10.0.0.5",
            "unit": 3,
            "mode": "readwrite",
            "register": 1000,
            "count": 16,
            "duration": "5s",
            "interval": "10ms",
        }))
        .unwrap();

        assert_eq!(config.transport.unit(), 3);
        assert_eq!(config.bench.mode(), Mode::ReadWrite);
        assert_eq!(config.bench.count(), 16);
    }

    #[test]
    fn cli_defaults_mirror_the_classic_tool() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["modbus-bench"]);
        assert!(!cli.rtu);
        assert_eq!(cli.port, 502);
        assert_eq!(cli.count, 10);
        assert_eq!(cli.duration, 10);
        assert_eq!(cli.interval, 0);
        assert_eq!(cli.mode, Mode::Read);
    }
}
