pub mod bandwidth;
pub mod expand;
pub mod export;
pub mod scan;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};

use frontscan_common::config::{CA_BUNDLE_FILE, CONFIG_FILE, Config, ScanConfig};
use frontscan_core::probe::TlsDialer;
use frontscan_core::store::ResultStore;
use frontscan_core::tls;

use crate::terminal::print;

#[derive(Parser)]
#[command(name = "frontscan")]
#[command(about = "Finds, ranks and exports TLS edge front-end addresses.")]
#[command(version)]
pub struct CommandLine {
    /// Directory holding the range, certificate and result files
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,
    /// Configuration file, `<dir>/config.json` by default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Print less; repeat for even less
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,
    /// Log every probe
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Exit without waiting for a key press
    #[arg(long, global = true)]
    pub no_wait: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe every address of the range file, then export (default)
    #[command(alias = "s")]
    Scan,
    /// Measure the throughput of previously successful addresses
    #[command(alias = "b")]
    Bandwidth,
    /// Rank the success file and write the export file
    #[command(alias = "e")]
    Export,
    /// Print the addresses denoted by range tokens
    #[command(alias = "x")]
    Expand {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn terminal_config(&self) -> Config {
        Config { quiet: self.quiet }
    }
}

/// Everything a phase needs: the working directory, its configuration and the result store.
pub struct Session {
    pub dir: PathBuf,
    pub scan: ScanConfig,
    pub cfg: Config,
    pub store: Arc<ResultStore>,
}

impl Session {
    pub fn open(cli: &CommandLine) -> anyhow::Result<Self> {
        let config_path: PathBuf = cli
            .config
            .clone()
            .unwrap_or_else(|| cli.dir.join(CONFIG_FILE));
        let scan = ScanConfig::load(&config_path)
            .with_context(|| format!("Could not load configuration from {}", config_path.display()))?;

        Ok(Self {
            store: Arc::new(ResultStore::new(&cli.dir)),
            dir: cli.dir.clone(),
            scan,
            cfg: cli.terminal_config(),
        })
    }

    /// Loads the pinned CA bundle and builds the dialer shared by every probe.
    pub fn dialer(&self) -> anyhow::Result<TlsDialer> {
        let bundle: PathBuf = self.dir.join(CA_BUNDLE_FILE);
        let roots = tls::load_roots(&bundle).context("Could not load the CA bundle")?;
        let connector = tls::build_connector(roots).context("Could not set up TLS")?;
        Ok(TlsDialer::new(connector, &self.scan))
    }

    pub fn print_settings(&self) {
        if self.cfg.quiet > 0 {
            return;
        }
        let s = &self.scan;
        print::header("settings", self.cfg.quiet);
        print::set_key_width(["Concurrency", "Timeouts", "Address pool", "Match mode"]);
        print::aligned_line("Concurrency", s.concurrency.to_string());
        print::aligned_line(
            "Timeouts",
            format!("dial {}ms, handshake {}ms", s.timeout, s.handshake_timeout),
        );
        let pool: String = match s.success_cap() {
            Some(cap) => format!("{cap} addresses"),
            None => "off".to_string(),
        };
        print::aligned_line("Address pool", pool);
        let mode: &str = if s.match_dns_names { "dns names" } else { "common name" };
        print::aligned_line("Match mode", mode);
    }
}
