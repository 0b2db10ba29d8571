//! Process configuration, assembled once from flags and environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Args;
use smartdb_describe::{LlmConfig, Provider};
use smartdb_schema::sanitize_table_name;

pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// LLM backend selection, shared by `serve` and `describe`.
#[derive(Args, Debug, Clone)]
pub struct LlmArgs {
    /// Describer backend: `placeholder`, `openai`, `anthropic` or `local`.
    #[arg(long = "llm", default_value = "placeholder")]
    pub llm: String,

    /// Model name (overrides OPENAI_MODEL / ANTHROPIC_MODEL / LOCAL_LLM_MODEL).
    #[arg(long)]
    pub llm_model: Option<String>,

    /// API base URL (overrides OPENAI_BASE_URL / ANTHROPIC_BASE_URL / LOCAL_LLM_URL).
    #[arg(long)]
    pub llm_base_url: Option<String>,

    /// Per-request timeout; 0 disables it.
    #[arg(long, default_value_t = 60)]
    pub llm_timeout_secs: u64,

    /// Retries for rate-limited or network-failed requests.
    #[arg(long, default_value_t = 3)]
    pub llm_max_retries: u32,
}

impl LlmArgs {
    pub fn to_config(&self) -> Result<LlmConfig> {
        let provider = Provider::parse(&self.llm)?;
        let config = LlmConfig::from_env(
            provider,
            self.llm_model.clone(),
            self.llm_base_url.clone(),
        )?
        .with_timeout_secs(self.llm_timeout_secs)
        .with_max_retries(self.llm_max_retries);
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,

    /// If set, write a small JSON file once the server is listening.
    #[arg(long)]
    pub ready_file: Option<PathBuf>,

    /// Directory holding named persistent databases (`database` request field).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Largest accepted request body, uploads included.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Everything the server needs, passed explicitly to its components.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub ready_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        if args.max_body_bytes == 0 {
            return Err(anyhow!("--max-body-bytes must be positive"));
        }
        Ok(Self {
            listen: args.listen,
            ready_file: args.ready_file.clone(),
            data_dir: args.data_dir.clone(),
            max_body_bytes: args.max_body_bytes,
            llm: args.llm.to_config()?,
        })
    }

    /// Map a client-supplied database name to a file inside the data dir.
    pub fn database_path(&self, name: Option<&str>) -> Result<Option<PathBuf>> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let Some(dir) = self.data_dir.as_deref() else {
            return Err(anyhow!(
                "named databases are disabled (server started without --data-dir)"
            ));
        };
        Ok(Some(database_file(dir, name)))
    }
}

fn database_file(dir: &Path, name: &str) -> PathBuf {
    let stem = name.strip_suffix(".db").unwrap_or(name);
    dir.join(format!("{}.db", sanitize_table_name(stem)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(data_dir: Option<&str>) -> AppConfig {
        AppConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            ready_file: None,
            data_dir: data_dir.map(PathBuf::from),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            llm: LlmConfig::placeholder(),
        }
    }

    #[test]
    fn test_database_names_stay_inside_data_dir() {
        let cfg = config(Some("/srv/smartdb"));
        assert_eq!(
            cfg.database_path(Some("../../etc/passwd")).unwrap(),
            Some(PathBuf::from("/srv/smartdb/______etc_passwd.db"))
        );
        assert_eq!(
            cfg.database_path(Some("Shop.db")).unwrap(),
            Some(PathBuf::from("/srv/smartdb/shop.db"))
        );
        assert_eq!(cfg.database_path(Some("  ")).unwrap(), None);
        assert_eq!(cfg.database_path(None).unwrap(), None);
    }

    #[test]
    fn test_database_requires_data_dir() {
        assert!(config(None).database_path(Some("shop")).is_err());
    }
}
