//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和配置来源选择。
//! 配置只在启动时读取一次。

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 以内联TOML提供完整配置的环境变量（容器场景）
pub const INLINE_CONFIG_ENV: &str = "WATCHDOG_CONFIG_TOML";

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "watchdog.toml";

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file(&self, path: &Path) -> Result<Config>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中 ${VAR} 形式的环境变量，缺失的变量是配置错误
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut missing = None;
        let result = env_var_regex.replace_all(content, |captures: &regex::Captures| {
            let var_name = &captures[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });

        if let Some(var) = missing {
            return Err(ConfigError::EnvVarError { var }.into());
        }

        Ok(result.into_owned())
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file(&self, path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 配置来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// 配置文件
    File(PathBuf),
    /// 环境变量中的内联TOML
    Inline,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Inline => write!(f, "${}", INLINE_CONFIG_ENV),
        }
    }
}

/// 选择配置来源：显式路径 > 内联环境变量 > 默认路径
pub fn resolve_config_source(explicit: Option<&Path>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::File(path.to_path_buf());
    }
    if std::env::var(INLINE_CONFIG_ENV).is_ok_and(|v| !v.trim().is_empty()) {
        return ConfigSource::Inline;
    }
    ConfigSource::File(get_default_config_path())
}

/// 按来源加载并验证配置
pub async fn load_config(explicit: Option<&Path>) -> Result<(Config, ConfigSource)> {
    let loader = TomlConfigLoader::default();
    let source = resolve_config_source(explicit);

    let config = match &source {
        ConfigSource::File(path) => loader.load_from_file(path).await?,
        ConfigSource::Inline => {
            let content = std::env::var(INLINE_CONFIG_ENV).map_err(|_| ConfigError::EnvVarError {
                var: INLINE_CONFIG_ENV.to_string(),
            })?;
            loader.load_from_string(&content).await?
        }
    };

    Ok((config, source))
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 watchdog.toml，否则使用用户配置目录
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|config_dir| config_dir.join("watchdog").join(DEFAULT_CONFIG_FILE))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const TEST_CONFIG_TOML: &str = r#"
[global]
default_interval_seconds = 15
log_level = "info"
max_concurrent_probes = 4

[[targets]]
name = "api"
probe = { kind = "http", url = "https://example.com/health", expected_status_codes = [200, 204] }
thresholds = { soft_failure = 2, hard_failure = 4, recovery = 1 }
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[[targets]]
name = "api"
probe = { kind = "http", url = "https://example.com/health", headers = { Authorization = "Bearer ${WATCHDOG_TEST_TOKEN}" } }
actions = [{ kind = "webhook", url = "${WATCHDOG_TEST_WEBHOOK}" }]
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.default_interval_seconds, 15);
        assert_eq!(config.global.max_concurrent_probes, 4);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].thresholds.hard_failure, 4);
        assert_eq!(config.targets[0].probe.kind(), "http");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("WATCHDOG_TEST_TOKEN", "test-token-123");
        env::set_var("WATCHDOG_TEST_WEBHOOK", "https://hooks.example.com/x");

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(TEST_CONFIG_WITH_ENV_VARS).await;

        env::remove_var("WATCHDOG_TEST_TOKEN");
        env::remove_var("WATCHDOG_TEST_WEBHOOK");

        let config = result.unwrap();
        match &config.targets[0].probe {
            crate::config::ProbeSpec::Http(http) => assert_eq!(
                http.headers.get("Authorization"),
                Some(&"Bearer test-token-123".to_string())
            ),
            other => panic!("unexpected probe: {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("WATCHDOG_TEST_TOKEN");
        env::set_var("WATCHDOG_TEST_WEBHOOK", "https://hooks.example.com/x");

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(TEST_CONFIG_WITH_ENV_VARS).await;
        env::remove_var("WATCHDOG_TEST_WEBHOOK");

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("WATCHDOG_TEST_TOKEN"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let loader = TomlConfigLoader::default();
        let err = loader
            .load_from_file(Path::new("/nonexistent/watchdog.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }

    #[tokio::test]
    async fn test_validation_failure_is_config_error() {
        let loader = TomlConfigLoader::new(false);
        let err = loader.load_from_string("[global]\n").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("至少需要配置一个监控目标"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    #[serial]
    fn test_resolve_config_source() {
        let explicit = Path::new("/etc/watchdog.toml");
        assert_eq!(
            resolve_config_source(Some(explicit)),
            ConfigSource::File(explicit.to_path_buf())
        );

        env::set_var(INLINE_CONFIG_ENV, TEST_CONFIG_TOML);
        assert_eq!(resolve_config_source(None), ConfigSource::Inline);
        env::remove_var(INLINE_CONFIG_ENV);

        assert!(matches!(resolve_config_source(None), ConfigSource::File(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_load_inline_config() {
        env::set_var(INLINE_CONFIG_ENV, TEST_CONFIG_TOML);
        let result = load_config(None).await;
        env::remove_var(INLINE_CONFIG_ENV);

        let (config, source) = result.unwrap();
        assert_eq!(source, ConfigSource::Inline);
        assert_eq!(config.targets[0].name, "api");
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().ends_with(DEFAULT_CONFIG_FILE));
    }
}
