use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub landmarker: LandmarkerConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Location of the gesture classifier. Relative directories resolve against
/// the process working directory at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_classifier_file")]
    pub model_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_file: default_classifier_file(),
            num_instances: default_model_instances(),
        }
    }
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        resolve(&self.model_dir, &self.model_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LandmarkerConfig {
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_landmarker_file")]
    pub model_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    /// `true` for NHWC input tensors, `false` for NCHW.
    #[serde(default = "default_channels_last")]
    pub channels_last: bool,
}

impl Default for LandmarkerConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_file: default_landmarker_file(),
            num_instances: default_model_instances(),
            input_size: default_input_size(),
            min_detection_confidence: default_min_detection_confidence(),
            channels_last: default_channels_last(),
        }
    }
}

impl LandmarkerConfig {
    pub fn get_path(&self) -> PathBuf {
        resolve(&self.model_dir, &self.model_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 {
            return Err("landmarker input_size must be greater than zero".into());
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(format!(
                "min_detection_confidence must be within [0, 1], got {}",
                self.min_detection_confidence
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelSetKind {
    Standard,
    #[default]
    Extended,
    File,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LabelsConfig {
    #[serde(default)]
    pub set: LabelSetKind,
    #[serde(default)]
    pub labels_file: Option<PathBuf>,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_classifier_file() -> String {
    "hand_landmarks.onnx".to_string()
}

fn default_landmarker_file() -> String {
    "hand_landmarker.onnx".to_string()
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

fn default_input_size() -> u32 {
    224
}

fn default_min_detection_confidence() -> f32 {
    0.5
}

fn default_channels_last() -> bool {
    true
}

fn resolve(dir: &Path, file: &str) -> PathBuf {
    let path = dir.join(file);
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), &environment, None)
}

/// `env_vars` replaces the process environment when given.
fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
    env_vars: Option<config::Map<String, String>>,
) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("SR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env_vars),
        )
        .build()?;

    let settings: Config = settings.try_deserialize::<Config>()?;

    settings.landmarker.validate().map_err(|e| {
        config::ConfigError::Message(format!("invalid landmarker configuration: {}", e))
    })?;
    if settings.labels.set == LabelSetKind::File && settings.labels.labels_file.is_none() {
        return Err(config::ConfigError::Message(
            "labels.set is `file` but no labels_file was given".into(),
        ));
    }

    Ok(settings)
}
