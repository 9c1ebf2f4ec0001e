use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_ADDR: &str = "127.0.0.1:8501";

/// Filesystem layout of one running instance.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub upload_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_file: root.join("config.json"),
            upload_dir: root.join("data"),
            db_path: root.join("knowledge.db"),
            log_dir: root.join("logs"),
            root,
        }
    }

    /// `KBQA_HOME` picks the root, `KBQA_CONFIG` overrides the config file.
    pub fn from_env() -> Self {
        let root = env::var("KBQA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let mut paths = Self::new(root);
        if let Ok(config) = env::var("KBQA_CONFIG") {
            paths.config_file = PathBuf::from(config);
        }
        paths
    }

    pub fn upload_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }
}

pub fn listen_addr() -> anyhow::Result<SocketAddr> {
    let raw = env::var("KBQA_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid KBQA_ADDR {raw:?}: {e}"))
}
