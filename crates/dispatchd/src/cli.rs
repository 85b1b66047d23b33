//! Command-line flags accepted by the dispatch service binary.

use clap::Parser;

/// Flags accepted by every dispatch service binary.
#[derive(Parser, Debug)]
#[command(
    about = "Fleet dispatch backbone service",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION")
)]
pub struct CliArgs {
    /// Join a service pool as a worker talking to `<addr>`; `#` marks this
    /// process as the pool master. Degenerate single-process deployments
    /// (the only kind this crate runs) treat any non-master value as "dial
    /// `<addr>` as a network-mode `ConsumerApi` client".
    #[arg(long, value_name = "ADDR", required = false)]
    pub team: Option<String>,

    /// Run standalone: embed a static registry and the driving loop in this
    /// process, with no pool master to join. Not a separate code path from
    /// mono — it serves the same router, backed by the same
    /// locally-embedded `ServiceContext`.
    #[arg(long, required = false)]
    pub solo: bool,

    /// Web backend with in-process collocated services (collections,
    /// driving loop, and the axum router in one process).
    #[arg(long, required = false)]
    pub mono: bool,

    /// Web backend development mode: verbose logging, permissive CORS.
    #[arg(long, required = false)]
    pub dev: bool,

    /// Use `<file name>` as the location of the config file.
    #[arg(short, long, required = false)]
    pub config: Option<String>,

    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, value_name = "HOST:PORT", required = false)]
    pub listen: Option<String>,
}

impl CliArgs {
    /// Resolve the effective run mode from the flag combination. `--team`
    /// takes priority over `--solo`/`--mono`; with neither `--team` nor
    /// `--solo`, the process runs mono (the documented default, matching
    /// `dispatchd`'s own `default = ["mono", ...]` feature set).
    pub fn mode(&self) -> RunMode {
        if let Some(addr) = &self.team {
            RunMode::Team(addr.clone())
        } else if self.solo {
            RunMode::Solo
        } else {
            RunMode::Mono
        }
    }
}

/// The resolved deployment mode for this process.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Drivers + static registry + HTTP/WebSocket edge, with no pool master.
    Solo,
    /// Drivers, static registry, and the HTTP/WebSocket edge, collocated.
    Mono,
    /// HTTP/WebSocket edge backed by a `ConsumerApi` dialing the drivers
    /// service at the given address; no local registry or driving loop.
    Team(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(team: Option<&str>, solo: bool, mono: bool) -> CliArgs {
        CliArgs {
            team: team.map(str::to_string),
            solo,
            mono,
            dev: false,
            config: None,
            listen: None,
        }
    }

    #[test]
    fn defaults_to_mono() {
        assert!(matches!(args(None, false, false).mode(), RunMode::Mono));
    }

    #[test]
    fn solo_flag_selects_solo() {
        assert!(matches!(args(None, true, false).mode(), RunMode::Solo));
    }

    #[test]
    fn team_flag_takes_priority_over_solo() {
        match args(Some("10.0.0.5:8420"), true, false).mode() {
            RunMode::Team(addr) => assert_eq!(addr, "10.0.0.5:8420"),
            other => panic!("expected Team mode, got {other:?}"),
        }
    }
}
