//! Runtime configuration.
//!
//! Every setting is a command-line flag with an environment variable
//! fallback. The sheet layout is not configurable.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use crate::store::LedgerStore;

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Directory holding the ledger workbooks
    #[arg(long, env = "AUDIENCIAS_FILES_DIR", default_value = "archivos")]
    pub files_dir: PathBuf,

    /// Base template new ledgers are copied from
    #[arg(long, env = "AUDIENCIAS_TEMPLATE", default_value = "Plantillas/plantilla_base")]
    pub template: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "AUDIENCIAS_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Public base URL used to build download links
    #[arg(long, env = "AUDIENCIAS_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,
}

impl Config {
    pub fn store(&self) -> LedgerStore {
        LedgerStore::new(&self.files_dir, &self.template)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "audiencias",
            "--files-dir",
            "/tmp/ledgers",
            "--bind",
            "0.0.0.0:9000",
            "--base-url",
            "https://audiencias.example/",
        ])
        .unwrap();

        assert_eq!(cli.config.files_dir, PathBuf::from("/tmp/ledgers"));
        assert_eq!(cli.config.bind.port(), 9000);
        assert_eq!(cli.config.base_url(), "https://audiencias.example");
        assert_eq!(cli.config.store().files_dir(), PathBuf::from("/tmp/ledgers").as_path());
    }

    #[test]
    fn malformed_bind_address_is_rejected() {
        assert!(Cli::try_parse_from(["audiencias", "--bind", "localhost"]).is_err());
    }
}
