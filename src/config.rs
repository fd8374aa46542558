use crate::{BotError, BotResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use toml::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    // 网关连接配置
    #[serde(default)]
    pub robot: RobotConfig,

    // 运行时配置
    #[serde(default)]
    pub core: CoreConfig,

    // 插件配置
    #[serde(flatten)]
    pub plugins: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RobotConfig {
    /// 网关地址，所有请求都 POST 到这里
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default)]
    pub token: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            token: "YOUR_TOKEN_HERE".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoreConfig {
    /// 单次网关/数据源调用的截止时间（秒）
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// 同时处理的消息数上限
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            max_concurrency: default_max_concurrency(),
            log_level: default_log_level(),
        }
    }
}

fn default_server() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_deadline_secs() -> u64 {
    15
}

fn default_max_concurrency() -> usize {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CoreConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs.max(1))
    }
}

impl AppConfig {
    /// 加载配置，文件不存在时写入默认配置
    pub async fn load<P: AsRef<Path>>(path: P) -> BotResult<AppConfig> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            let default_cfg = AppConfig::default();
            default_cfg.save(path).await?;
            return Ok(default_cfg);
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> BotResult<AppConfig> {
        toml::from_str(content).map_err(|e| BotError::Config(e.to_string()))
    }

    /// 原子写入（写临时文件 -> Rename 覆盖）
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> BotResult<()> {
        let path = path.as_ref();
        let toml_string =
            toml::to_string_pretty(self).map_err(|e| BotError::Config(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, toml_string).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    /// 获取指定插件的配置
    pub fn get_plugin_config<T: for<'de> Deserialize<'de>>(&self, plugin_id: &str) -> Option<T> {
        self.plugins
            .get(plugin_id)
            .and_then(|v| v.clone().try_into().ok())
    }

    /// 插件段缺失或未写 enabled 时视为启用
    pub fn is_plugin_enabled(&self, plugin_id: &str) -> bool {
        self.plugins
            .get(plugin_id)
            .and_then(|v| v.get("enabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_defaults_for_missing_sections() {
        let cfg = AppConfig::parse("[robot]\ntoken = \"abc\"\n").unwrap();
        assert_eq!(cfg.robot.token, "abc");
        assert_eq!(cfg.robot.server, "http://127.0.0.1:8090");
        assert_eq!(cfg.core.deadline(), Duration::from_secs(15));
        assert_eq!(cfg.core.max_concurrency, 32);
    }

    #[test]
    fn plugin_sections_are_flattened() {
        let cfg = AppConfig::parse(
            r#"
            [covid19]
            enabled = false
            api = "http://localhost/data/inner"

            [menu]
            "#,
        )
        .unwrap();

        assert!(!cfg.is_plugin_enabled("covid19"));
        assert!(cfg.is_plugin_enabled("menu"));
        assert!(cfg.is_plugin_enabled("absent"));

        #[derive(Deserialize)]
        struct Section {
            api: String,
        }
        let section: Section = cfg.get_plugin_config("covid19").unwrap();
        assert_eq!(section.api, "http://localhost/data/inner");
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            AppConfig::parse("[robot\n"),
            Err(BotError::Config(_))
        ));
    }

    #[tokio::test]
    async fn writes_default_file_when_missing() {
        let dir = std::env::temp_dir().join(format!("wxbot-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_dir_all(&dir).await;

        let cfg = AppConfig::load(&path).await.unwrap();
        assert_eq!(cfg.robot.token, "YOUR_TOKEN_HERE");
        assert!(fs::try_exists(&path).await.unwrap());

        let reloaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(reloaded.core.log_level, "info");

        let _ = fs::remove_dir_all(&dir).await;
    }
}
