use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `cuckoo-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is honored), with defaults suitable for a single-node deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cuckoo-server",
    version,
    about = "A gRPC registry of named cuckoo filters"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/cuckoo.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Directory holding one snapshot file per filter.
    ///
    /// Loaded once at startup and rewritten by every dump.
    ///
    /// Environment variable: `DUMP_PATH`
    #[arg(long, env = "DUMP_PATH", default_value = "dump")]
    pub dump_path: PathBuf,

    /// Seconds between periodic dumps.
    ///
    /// Environment variable: `DUMP_INTERVAL_SECS`
    #[arg(long, env = "DUMP_INTERVAL_SECS", default_value_t = 900)]
    pub dump_interval_secs: u64,

    /// Run one last dump after the scheduler has drained during shutdown.
    ///
    /// Environment variable: `DUMP_ON_SHUTDOWN`
    #[arg(long, env = "DUMP_ON_SHUTDOWN", default_value_t = false)]
    pub dump_on_shutdown: bool,

    /// Capacity of the outbound queue of each streaming lookup session.
    ///
    /// Lower values apply backpressure to the inbound reader sooner; higher
    /// values let more matches pile up while the client is slow to read.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for open streaming sessions to finish on shutdown
    /// before they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub dump_path: PathBuf,
    pub dump_interval: Duration,
    pub dump_on_shutdown: bool,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.dump_interval_secs == 0 {
            bail!("DUMP_INTERVAL_SECS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.dump_path.as_os_str().is_empty() {
            bail!("DUMP_PATH must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            dump_path: args.dump_path,
            dump_interval: Duration::from_secs(args.dump_interval_secs),
            dump_on_shutdown: args.dump_on_shutdown,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> CliArgs {
        let argv = core::iter::once("cuckoo-server").chain(extra.iter().copied());
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = ServerConfig::try_from(parse(&[
            "--server-addr",
            "127.0.0.1:6000",
            "--dump-path",
            "/var/lib/cuckoo",
            "--dump-interval-secs",
            "60",
            "--dump-on-shutdown",
            "--stream-buffer-size",
            "32",
            "--shutdown-timeout-secs",
            "10",
        ]))
        .unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:6000");
        assert!(!config.uds);
        assert_eq!(config.dump_path, PathBuf::from("/var/lib/cuckoo"));
        assert_eq!(config.dump_interval, Duration::from_secs(60));
        assert!(config.dump_on_shutdown);
        assert_eq!(config.stream_buffer_size, 32);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = ServerConfig::try_from(parse(&["--dump-interval-secs", "0"])).unwrap_err();
        assert!(err.to_string().contains("DUMP_INTERVAL_SECS"));
    }

    #[test]
    fn rejects_zero_buffer() {
        let err = ServerConfig::try_from(parse(&["--stream-buffer-size", "0"])).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }

    #[test]
    fn rejects_empty_dump_path() {
        let err = ServerConfig::try_from(parse(&["--dump-path", ""])).unwrap_err();
        assert!(err.to_string().contains("DUMP_PATH"));
    }
}
