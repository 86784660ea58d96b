use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 谓词查询命中但文件已消失时的处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationPolicy {
    /// 整个读请求以 NotFound 失败
    #[default]
    Strict,
    /// 记录告警并丢弃该命中
    SkipStale,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub datapath: PathBuf,
    pub listen: SocketAddr,
    pub hydration: HydrationPolicy,
    pub lock_stripes: usize,
    /// 周期性写索引快照；0 关闭
    pub flush_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datapath: default_datapath(),
            listen: SocketAddr::from(([127, 0, 0, 1], 9460)),
            hydration: HydrationPolicy::Strict,
            lock_stripes: 64,
            flush_interval_secs: 300,
        }
    }
}

fn default_datapath() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("recstore"))
        .unwrap_or_else(|| PathBuf::from("/var/tmp/recstore"))
}

impl Config {
    pub fn with_datapath(datapath: impl Into<PathBuf>) -> Self {
        Self {
            datapath: datapath.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path.display(), e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock_stripes == 0 {
            anyhow::bail!("lock_stripes must be at least 1");
        }
        if self.datapath.as_os_str().is_empty() {
            anyhow::bail!("datapath must not be empty");
        }
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.datapath.join("index")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
datapath = "/srv/recstore"
hydration = "skip_stale"
"#,
        )
        .unwrap();
        assert_eq!(cfg.datapath, PathBuf::from("/srv/recstore"));
        assert_eq!(cfg.hydration, HydrationPolicy::SkipStale);
        assert_eq!(cfg.lock_stripes, 64);
        assert_eq!(cfg.listen.port(), 9460);
        assert_eq!(cfg.index_dir(), PathBuf::from("/srv/recstore/index"));
    }

    #[test]
    fn zero_stripes_is_rejected() {
        assert!(Config::from_toml("lock_stripes = 0").is_err());
        assert!(Config::from_toml("hydration = \"lenient\"").is_err());
    }
}
