use crate::workflows::expense::{Deadlines, EvaluatorMode, PipelineOptions, ReportMode};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-2024-08-06";
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
    pub vision: VisionConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline: PipelineConfig::from_env()?,
            vision: VisionConfig::from_env(),
            mail: MailConfig::from_env(),
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Concurrency, deadlines and output location for pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrency: usize,
    pub extraction_timeout: Duration,
    pub compliance_timeout: Duration,
    pub report_timeout: Duration,
    pub notify_timeout: Duration,
    pub output_dir: PathBuf,
    pub receipts_dir: PathBuf,
    pub evaluator: EvaluatorMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            extraction_timeout: Duration::from_secs(60),
            compliance_timeout: Duration::from_secs(60),
            report_timeout: Duration::from_secs(120),
            notify_timeout: Duration::from_secs(30),
            output_dir: PathBuf::from("output"),
            receipts_dir: PathBuf::from("receipts"),
            evaluator: EvaluatorMode::Rules,
        }
    }
}

impl PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_concurrency = match env::var("EXPENSE_MAX_CONCURRENCY") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if value >= 1 => value,
                _ => return Err(ConfigError::InvalidConcurrency(raw)),
            },
            Err(_) => defaults.max_concurrency,
        };

        let evaluator = match env::var("EXPENSE_EVALUATOR") {
            Ok(raw) => EvaluatorMode::parse(&raw).ok_or(ConfigError::InvalidEvaluator(raw))?,
            Err(_) => defaults.evaluator,
        };

        Ok(Self {
            max_concurrency,
            extraction_timeout: seconds_var(
                "EXPENSE_EXTRACTION_TIMEOUT_SECS",
                defaults.extraction_timeout,
            )?,
            compliance_timeout: seconds_var(
                "EXPENSE_COMPLIANCE_TIMEOUT_SECS",
                defaults.compliance_timeout,
            )?,
            report_timeout: seconds_var("EXPENSE_REPORT_TIMEOUT_SECS", defaults.report_timeout)?,
            notify_timeout: seconds_var("EXPENSE_NOTIFY_TIMEOUT_SECS", defaults.notify_timeout)?,
            output_dir: env::var("EXPENSE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            receipts_dir: env::var("EXPENSE_RECEIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.receipts_dir),
            evaluator,
        })
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            max_concurrency: self.max_concurrency,
            deadlines: Deadlines {
                extraction: Some(self.extraction_timeout),
                compliance: Some(self.compliance_timeout),
                report: Some(self.report_timeout),
                notification: Some(self.notify_timeout),
            },
            report_mode: ReportMode::Barrier,
        }
    }
}

fn seconds_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidTimeout { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// OpenAI-compatible endpoint used for extraction and delegated compliance.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub judge_model: String,
}

impl VisionConfig {
    fn from_env() -> Self {
        Self {
            api_key: non_empty_var("OPENAI_API_KEY"),
            base_url: non_empty_var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            vision_model: non_empty_var("OPENAI_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            judge_model: non_empty_var("OPENAI_JUDGE_MODEL")
                .unwrap_or_else(|| DEFAULT_JUDGE_MODEL.to_string()),
        }
    }
}

/// SendGrid delivery settings. Incomplete settings mean log-only notification.
#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub api_key: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
}

impl MailConfig {
    fn from_env() -> Self {
        Self {
            api_key: non_empty_var("SENDGRID_API_KEY"),
            sender: non_empty_var("SENDER_EMAIL"),
            recipient: non_empty_var("RECIPIENT_EMAIL"),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() && self.sender.is_some() && self.recipient.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidConcurrency(String),
    InvalidTimeout { name: &'static str, value: String },
    InvalidEvaluator(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidConcurrency(value) => write!(
                f,
                "EXPENSE_MAX_CONCURRENCY must be a positive integer, got '{value}'"
            ),
            ConfigError::InvalidTimeout { name, value } => {
                write!(f, "{name} must be a positive number of seconds, got '{value}'")
            }
            ConfigError::InvalidEvaluator(value) => {
                write!(f, "EXPENSE_EVALUATOR must be 'rules' or 'llm', got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
