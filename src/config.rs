//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use cyberblades_ui::historian::default_socket_path;

/// Live terminal dashboard for the Beat Saber historian.
#[derive(Debug, Clone, Parser)]
#[command(name = "cyberblades", version, about)]
pub struct Config {
    /// Unix socket of the historian [default: $XDG_RUNTIME_DIR/historian.sock]
    #[arg(long, value_name = "PATH", env = "CYBERBLADES_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Player to select whenever the historian connects
    #[arg(long, value_name = "NAME", env = "CYBERBLADES_PLAYER")]
    pub player: Option<String>,

    /// Log file [default: <cache dir>/cyberblades/cyberblades.log]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Input poll interval in milliseconds
    #[arg(
        long,
        value_name = "MS",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(10..=1000)
    )]
    pub tick_ms: u64,
}

impl Config {
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(default_socket_path)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("cyberblades")
                .join("cyberblades.log")
        })
    }

    /// The configured player, ignoring blank names.
    pub fn player(&self) -> Option<&str> {
        self.player
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
