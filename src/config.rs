use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::processor::ProcessConfig;
use crate::scene_detector::DetectorConfig;
use crate::similarity::SimilarityMethod;

/// 配置文件中的主节名
const SECTION: &str = "scene_detect";
/// 环境变量前缀
const ENV_PREFIX: &str = "VIDEO_SCD_";
const DEFAULT_CONFIG_NAME: &str = "video-scene-cut.ini";
const HIDDEN_CONFIG_NAME: &str = ".video-scene-cut.ini";

/// 某一配置来源给出的值，没有给出的项为 None
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub window_size: Option<usize>,
    pub method: Option<String>,
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
    pub s: Option<f64>,
    pub k: Option<usize>,
    pub warmup: Option<usize>,
    pub display: Option<bool>,
    pub output: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub sample_rate: Option<f64>,
}

impl ConfigOverrides {
    /// 逐项合并，`self` 中已有的值优先
    pub fn or(self, lower: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            window_size: self.window_size.or(lower.window_size),
            method: self.method.or(lower.method),
            a: self.a.or(lower.a),
            b: self.b.or(lower.b),
            c: self.c.or(lower.c),
            s: self.s.or(lower.s),
            k: self.k.or(lower.k),
            warmup: self.warmup.or(lower.warmup),
            display: self.display.or(lower.display),
            output: self.output.or(lower.output),
            output_dir: self.output_dir.or(lower.output_dir),
            sample_rate: self.sample_rate.or(lower.sample_rate),
        }
    }

    /// 用默认值补齐缺失项；方法名无法识别时返回 InvalidConfiguration
    pub fn resolve(self) -> Result<ProcessConfig> {
        let defaults = ProcessConfig::default();
        let method = match self.method {
            Some(name) => name.parse::<SimilarityMethod>()?,
            None => defaults.detector.method,
        };

        let config = ProcessConfig {
            detector: DetectorConfig {
                window_size: self.window_size.unwrap_or(defaults.detector.window_size),
                method,
                a: self.a.unwrap_or(defaults.detector.a),
                b: self.b.unwrap_or(defaults.detector.b),
                c: self.c.unwrap_or(defaults.detector.c),
                s: self.s.unwrap_or(defaults.detector.s),
                k: self.k.unwrap_or(defaults.detector.k),
                warmup: self.warmup.unwrap_or(defaults.detector.warmup),
            },
            display: self.display.unwrap_or(defaults.display),
            output: self.output.unwrap_or(defaults.output),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            sample_rate: self.sample_rate.or(defaults.sample_rate),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// 解析数值，失败时记录警告并忽略该项
fn parse_value<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("⚠️  [配置] 无法解析配置项 {}={}，已忽略", key, value);
            None
        }
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(config_file: Option<&Path>, cli: ConfigOverrides) -> Result<ProcessConfig> {
        // 1. 先加载配置文件（如果存在）
        let file_config = match config_file {
            Some(config_path) => Self::load_from_file(config_path)?,
            // 尝试从默认位置加载
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        // 2. 加载环境变量
        let env_config = Self::load_from_env();

        // 3. 合并配置
        cli.or(env_config).or(file_config).resolve()
    }

    /// 从环境变量加载配置
    pub fn load_from_env() -> ConfigOverrides {
        Self::load_from_lookup(|key| env::var(key).ok())
    }

    /// 通过给定的查找函数读取 `VIDEO_SCD_*` 变量
    pub fn load_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigOverrides {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        ConfigOverrides {
            window_size: parse_value("VIDEO_SCD_WINDOW_SIZE", get("WINDOW_SIZE")),
            method: get("METHOD").filter(|v| !v.trim().is_empty()),
            a: parse_value("VIDEO_SCD_A", get("A")),
            b: parse_value("VIDEO_SCD_B", get("B")),
            c: parse_value("VIDEO_SCD_C", get("C")),
            s: parse_value("VIDEO_SCD_S", get("S")),
            k: parse_value("VIDEO_SCD_K", get("K")),
            warmup: parse_value("VIDEO_SCD_WARMUP", get("WARMUP")),
            display: get("DISPLAY").and_then(|v| parse_bool(&v)),
            output: get("OUTPUT").and_then(|v| parse_bool(&v)),
            output_dir: get("OUTPUT_DIR").filter(|v| !v.is_empty()).map(PathBuf::from),
            sample_rate: parse_value("VIDEO_SCD_SAMPLE_RATE", get("SAMPLE_RATE")),
        }
    }

    fn read_ini(config_path: &Path) -> Result<configparser::ini::Ini> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;
        Ok(config_parser)
    }

    /// 从INI配置文件加载配置
    pub fn load_from_file(config_path: &Path) -> Result<ConfigOverrides> {
        let config_parser = Self::read_ini(config_path)?;

        // 尝试从 [scene_detect] 节读取，如果没有则使用 [DEFAULT] 节
        let get = |key: &str| {
            config_parser
                .get(SECTION, key)
                .or_else(|| config_parser.get("DEFAULT", key))
        };

        Ok(ConfigOverrides {
            window_size: parse_value("window_size", get("window_size")),
            method: get("method").filter(|v| !v.trim().is_empty()),
            a: parse_value("a", get("a")),
            b: parse_value("b", get("b")),
            c: parse_value("c", get("c")),
            s: parse_value("s", get("s")),
            k: parse_value("k", get("k")),
            warmup: parse_value("warmup", get("warmup")),
            display: get("display").and_then(|v| parse_bool(&v)),
            output: get("output").and_then(|v| parse_bool(&v)),
            output_dir: get("output_dir").filter(|v| !v.is_empty()).map(PathBuf::from),
            sample_rate: parse_value("sample_rate", get("sample_rate")),
        })
    }

    fn find_default_config() -> Option<PathBuf> {
        // 1. 当前目录的 video-scene-cut.ini
        // 2. 当前目录的 .video-scene-cut.ini
        let mut candidates = vec![
            PathBuf::from(DEFAULT_CONFIG_NAME),
            PathBuf::from(HIDDEN_CONFIG_NAME),
        ];
        // 3. 用户主目录的 .video-scene-cut.ini
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(HIDDEN_CONFIG_NAME));
        }
        // 4. /etc/video-scene-cut.ini (Linux/macOS)
        candidates.push(PathBuf::from("/etc").join(DEFAULT_CONFIG_NAME));

        candidates.into_iter().find(|p| p.exists())
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<ConfigOverrides> {
        match Self::find_default_config() {
            Some(path) => Self::load_from_file(&path),
            None => Err(anyhow::anyhow!("未找到配置文件")),
        }
    }

    /// 日志级别（trace, debug, info, warn, error），优先级：环境变量 > 配置文件 > info
    pub fn load_log_level(config_file: Option<&Path>) -> String {
        if let Ok(level) = env::var("LOG_LEVEL") {
            return level;
        }

        let path = config_file
            .map(Path::to_path_buf)
            .or_else(Self::find_default_config);
        path.and_then(|p| Self::read_ini(&p).ok())
            .and_then(|ini| ini.get("logging", "level").or_else(|| ini.get("DEFAULT", "log_level")))
            .unwrap_or_else(|| "info".to_string())
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let defaults = ProcessConfig::default();
        let detector = &defaults.detector;

        let mut config_parser = configparser::ini::Ini::new();
        let mut set = |section: &str, key: &str, value: String| {
            config_parser.set(section, key, Some(value));
        };
        set(SECTION, "window_size", detector.window_size.to_string());
        set(SECTION, "method", detector.method.to_string());
        set(SECTION, "a", detector.a.to_string());
        set(SECTION, "b", detector.b.to_string());
        set(SECTION, "c", detector.c.to_string());
        set(SECTION, "s", detector.s.to_string());
        set(SECTION, "k", detector.k.to_string());
        set(SECTION, "warmup", detector.warmup.to_string());
        set(SECTION, "display", defaults.display.to_string());
        set(SECTION, "output", defaults.output.to_string());
        set(SECTION, "output_dir", defaults.output_dir.to_string_lossy().to_string());
        set(SECTION, "sample_rate", String::new());
        set("logging", "level", "info".to_string());

        config_parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = ConfigOverrides::default().resolve().unwrap();
        assert_eq!(config, ProcessConfig::default());
        assert_eq!(config.detector.window_size, 20);
        assert_eq!(config.detector.method, SimilarityMethod::Sad);
        assert_eq!(config.output_dir, PathBuf::from("./output"));
    }

    #[test]
    fn test_precedence_cli_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scd.ini");
        std::fs::write(
            &path,
            "[scene_detect]\nwindow_size = 30\nmethod = ssd\nk = 5\ns = 0.005\n\n[logging]\nlevel = debug\n",
        )
        .unwrap();

        let file = ConfigLoader::load_from_file(&path).unwrap();
        let vars: HashMap<&str, &str> =
            [("VIDEO_SCD_K", "8"), ("VIDEO_SCD_METHOD", "corr"), ("VIDEO_SCD_DISPLAY", "yes")]
                .into_iter()
                .collect();
        let env = ConfigLoader::load_from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        let cli = ConfigOverrides {
            method: Some("MAD".to_string()),
            ..ConfigOverrides::default()
        };

        let config = cli.or(env).or(file).resolve().unwrap();
        assert_eq!(config.detector.method, SimilarityMethod::Mad);
        assert_eq!(config.detector.k, 8);
        assert_eq!(config.detector.window_size, 30);
        assert_eq!(config.detector.s, 0.005);
        assert_eq!(config.detector.b, 2.0);
        assert!(config.display);
        assert!(!config.output);
    }

    #[test]
    fn test_unknown_method_is_invalid_configuration() {
        let overrides = ConfigOverrides {
            method: Some("histogram".to_string()),
            ..ConfigOverrides::default()
        };
        let err = overrides.resolve().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DetectError>(),
            Some(DetectError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let overrides = ConfigOverrides {
            window_size: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(overrides.resolve().is_err());
    }

    #[test]
    fn test_unparseable_values_are_ignored() {
        let vars: HashMap<&str, &str> = [("VIDEO_SCD_WINDOW_SIZE", "many"), ("VIDEO_SCD_A", "-0.5")]
            .into_iter()
            .collect();
        let env = ConfigLoader::load_from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(env.window_size, None);
        assert_eq!(env.a, Some(-0.5));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigLoader::load_config(
            Some(Path::new("/no/such/video-scene-cut.ini")),
            ConfigOverrides::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.ini");
        ConfigLoader::create_default_config(&path).unwrap();

        let loaded = ConfigLoader::load_from_file(&path).unwrap().resolve().unwrap();
        assert_eq!(loaded, ProcessConfig::default());
    }
}
