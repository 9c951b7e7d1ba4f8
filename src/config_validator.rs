// Configuration validation module for the subtitle service
//
// This module validates configuration parameters read from environment variables at
// startup, so that a bad port or a typo in a task name fails early with a clear message
// instead of surfacing on the first transcription request.
//
// The validation is schema-driven: every parameter is declared once in CONFIG_PARAMS with
// its type, default and constraints.

use std::env;
use std::net::IpAddr;

use log::{error, info, warn};

use crate::subtitles::VALID_OUTPUT_FORMATS;

/// Configuration parameter types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigType {
    String,
    UnsignedInteger,
    Boolean,
    IpAddress,
    Port,
    Enum(&'static [&'static str]),
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must be valid for application to start
    Warning,  // Optional, generates warnings only
}

/// Configuration parameter definition
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: &'static str,
    pub description: &'static str,
    pub param_type: ConfigType,
    pub default_value: Option<&'static str>,
    pub validation_level: ValidationLevel,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
}

const TASKS: &[&str] = &["transcribe", "translate"];

/// Centralized configuration parameter registry
pub const CONFIG_PARAMS: &[ConfigParam] = &[
    // Server Configuration
    ConfigParam {
        name: "SUBTITLE_API_HOST",
        description: "Host IP address for the API server",
        param_type: ConfigType::IpAddress,
        default_value: Some("127.0.0.1"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "SUBTITLE_API_PORT",
        description: "Port for the API server",
        param_type: ConfigType::Port,
        default_value: Some("3000"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "SUBTITLE_API_TIMEOUT",
        description: "Client disconnect timeout in seconds",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("480"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(1),
        max_value: Some(3600),
    },
    ConfigParam {
        name: "SUBTITLE_API_KEEPALIVE",
        description: "Keep-alive timeout in seconds",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("480"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(1),
        max_value: Some(3600),
    },
    ConfigParam {
        name: "HTTP_WORKER_NUMBER",
        description: "Number of HTTP workers (0 = use CPU cores)",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("0"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(0),
        max_value: Some(64),
    },
    // Upload Configuration
    ConfigParam {
        name: "SUBTITLE_TMP_FILES",
        description: "Directory for uploaded audio files",
        param_type: ConfigType::String,
        default_value: Some("./tmp/uploads"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "MAX_FILE_SIZE",
        description: "Maximum upload size in bytes",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("536870912"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(1024),
        max_value: None,
    },
    // Transcription Defaults
    ConfigParam {
        name: "DEFAULT_MODEL",
        description: "Model used when the request does not name one",
        param_type: ConfigType::String,
        default_value: Some("base"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "DEFAULT_LANGUAGE",
        description: "Language code used when the request does not name one (auto = detect)",
        param_type: ConfigType::String,
        default_value: Some("zh"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "DEFAULT_TASK",
        description: "Task used when the request does not name one",
        param_type: ConfigType::Enum(TASKS),
        default_value: Some("transcribe"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "DEFAULT_OUTPUT_FORMAT",
        description: "Response format used when the request does not name one",
        param_type: ConfigType::Enum(&VALID_OUTPUT_FORMATS),
        default_value: Some("json"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    // Queue Configuration
    ConfigParam {
        name: "MAX_WAITING_JOBS",
        description: "Maximum number of waiting jobs (0 = unbounded)",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("0"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(0),
        max_value: None,
    },
    // Transcription Tool
    ConfigParam {
        name: "TRANSCRIBE_CMD",
        description: "Executable of the transcription tool",
        param_type: ConfigType::String,
        default_value: Some("python3"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "TRANSCRIBE_SCRIPT",
        description: "Script passed to the executable (empty = none)",
        param_type: ConfigType::String,
        default_value: Some("scripts/whisper_transcribe.py"),
        validation_level: ValidationLevel::Warning,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "TRANSCRIBE_DEVICE",
        description: "Inference device passed to the tool",
        param_type: ConfigType::String,
        default_value: Some("cpu"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "TRANSCRIBE_THREADS",
        description: "CPU threads passed to the tool",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("8"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(1),
        max_value: Some(256),
    },
    // Security
    ConfigParam {
        name: "ENABLE_AUTHORIZATION",
        description: "Require a bearer token on API requests",
        param_type: ConfigType::Boolean,
        default_value: Some("false"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
];

/// Configuration validation errors with detailed context
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub error_type: ConfigErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErrorType {
    InvalidValue,
    InvalidFormat,
    InvalidRange,
    FileNotFound,
    Required,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Configuration error in '{}' ({:?}): {} (value: '{}')",
            self.field, self.error_type, self.message, self.value
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " - Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Configuration validation results
#[derive(Debug, Default)]
pub struct ValidationResults {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResults {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add(&mut self, level: ValidationLevel, error: ConfigValidationError) {
        match level {
            ValidationLevel::Critical => self.errors.push(error),
            ValidationLevel::Warning => self.warnings.push(error),
        }
    }

    pub fn print_summary(&self) {
        if !self.errors.is_empty() {
            error!(
                "Configuration validation found {} error(s):",
                self.errors.len()
            );
            for (i, err) in self.errors.iter().enumerate() {
                error!("  {}. {}", i + 1, err);
            }
        }

        if !self.warnings.is_empty() {
            warn!(
                "Configuration validation found {} warning(s):",
                self.warnings.len()
            );
            for (i, warn) in self.warnings.iter().enumerate() {
                warn!("  {}. {}", i + 1, warn);
            }
        }

        if self.is_valid() && self.warnings.is_empty() {
            info!("Configuration validation passed successfully");
        } else if self.is_valid() {
            info!(
                "Configuration validation passed with {} warning(s)",
                self.warnings.len()
            );
        }
    }
}

pub mod validators {
    use super::*;

    fn invalid(
        field: &str,
        value: &str,
        error_type: ConfigErrorType,
        message: String,
        suggestion: Option<String>,
    ) -> ConfigValidationError {
        ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            error_type,
            message,
            suggestion,
        }
    }

    /// Validate boolean values from string
    pub fn validate_boolean(field: &str, value: &str) -> ValidationResult<bool> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Invalid boolean value".to_string(),
                Some("Use 'true' or 'false'".to_string()),
            )),
        }
    }

    /// Validate unsigned integer values with optional range
    pub fn validate_unsigned(
        field: &str,
        value: &str,
        min: Option<u64>,
        max: Option<u64>,
    ) -> ValidationResult<u64> {
        let parsed = value.parse::<u64>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid unsigned integer format".to_string(),
                Some("Use a valid positive integer number".to_string()),
            )
        })?;

        if let Some(min) = min {
            if parsed < min {
                return Err(invalid(
                    field,
                    value,
                    ConfigErrorType::InvalidRange,
                    format!("Value {} is below minimum {}", parsed, min),
                    Some(format!("Use a value >= {}", min)),
                ));
            }
        }

        if let Some(max) = max {
            if parsed > max {
                return Err(invalid(
                    field,
                    value,
                    ConfigErrorType::InvalidRange,
                    format!("Value {} is above maximum {}", parsed, max),
                    Some(format!("Use a value <= {}", max)),
                ));
            }
        }

        Ok(parsed)
    }

    /// Validate IP address
    pub fn validate_ip_address(field: &str, value: &str) -> ValidationResult<IpAddr> {
        value.parse::<IpAddr>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid IP address format".to_string(),
                Some("Use a valid IPv4 or IPv6 address (e.g., 127.0.0.1 or 0.0.0.0)".to_string()),
            )
        })
    }

    /// Validate port number
    pub fn validate_port(field: &str, value: &str) -> ValidationResult<u16> {
        let port = value.parse::<u16>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid port number format".to_string(),
                Some("Use a number between 1 and 65535".to_string()),
            )
        })?;

        if port == 0 {
            return Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                "Port 0 is not allowed".to_string(),
                Some("Use a number between 1 and 65535".to_string()),
            ));
        }

        Ok(port)
    }

    /// Validate against a fixed list of values (case-insensitive)
    pub fn validate_enum(
        field: &str,
        value: &str,
        valid_values: &[&str],
    ) -> ValidationResult<String> {
        let lowered = value.trim().to_lowercase();
        if valid_values.contains(&lowered.as_str()) {
            Ok(lowered)
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Unsupported value".to_string(),
                Some(format!("Use one of: {}", valid_values.join(", "))),
            ))
        }
    }

    /// Validate a non-blank string
    pub fn validate_not_blank(field: &str, value: &str) -> ValidationResult<()> {
        if value.trim().is_empty() {
            Err(invalid(
                field,
                value,
                ConfigErrorType::Required,
                "Value must not be blank".to_string(),
                Some(format!("Set {} or remove it to use the default", field)),
            ))
        } else {
            Ok(())
        }
    }
}

/// Configuration validator for the subtitle service
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate every registered parameter from the current environment
    pub fn validate() -> ValidationResults {
        Self::validate_with(|name| env::var(name).ok())
    }

    /// Validate using `lookup` to resolve parameter values
    pub fn validate_with<F>(lookup: F) -> ValidationResults
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut results = ValidationResults::default();

        for param in CONFIG_PARAMS {
            let Some(value) = lookup(param.name).or_else(|| param.default_value.map(String::from))
            else {
                continue;
            };

            if let Err(error) = Self::validate_parameter(param, &value) {
                results.add(param.validation_level, error);
            }
        }

        Self::validate_cross_dependencies(&mut results, &lookup);
        Self::validate_tool_script(&mut results, &lookup);
        results
    }

    fn validate_parameter(param: &ConfigParam, value: &str) -> ValidationResult<()> {
        match param.param_type {
            ConfigType::String => {
                // TRANSCRIBE_SCRIPT may legitimately be empty
                if param.name != "TRANSCRIBE_SCRIPT" {
                    validators::validate_not_blank(param.name, value)?;
                }
            }
            ConfigType::UnsignedInteger => {
                validators::validate_unsigned(param.name, value, param.min_value, param.max_value)?;
            }
            ConfigType::Boolean => {
                validators::validate_boolean(param.name, value)?;
            }
            ConfigType::IpAddress => {
                validators::validate_ip_address(param.name, value)?;
            }
            ConfigType::Port => {
                validators::validate_port(param.name, value)?;
            }
            ConfigType::Enum(valid_values) => {
                validators::validate_enum(param.name, value, valid_values)?;
            }
        }
        Ok(())
    }

    /// Validate cross-parameter dependencies
    fn validate_cross_dependencies<F>(results: &mut ValidationResults, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_enabled = lookup("ENABLE_AUTHORIZATION")
            .and_then(|v| validators::validate_boolean("ENABLE_AUTHORIZATION", &v).ok())
            .unwrap_or(false);
        let token = lookup("API_TOKEN").filter(|t| !t.trim().is_empty());

        if auth_enabled && token.is_none() {
            results.add(
                ValidationLevel::Critical,
                ConfigValidationError {
                    field: "API_TOKEN".to_string(),
                    value: "".to_string(),
                    error_type: ConfigErrorType::Required,
                    message: "API_TOKEN is required when ENABLE_AUTHORIZATION is true"
                        .to_string(),
                    suggestion: Some(
                        "Set API_TOKEN or disable ENABLE_AUTHORIZATION".to_string(),
                    ),
                },
            );
        }
    }

    /// Warn when the configured script does not exist; the tool may still resolve it
    fn validate_tool_script<F>(results: &mut ValidationResults, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let script = lookup("TRANSCRIBE_SCRIPT").unwrap_or_else(|| {
            CONFIG_PARAMS
                .iter()
                .find(|p| p.name == "TRANSCRIBE_SCRIPT")
                .and_then(|p| p.default_value)
                .unwrap_or_default()
                .to_string()
        });

        if !script.trim().is_empty() && !std::path::Path::new(&script).is_file() {
            results.add(
                ValidationLevel::Warning,
                ConfigValidationError {
                    field: "TRANSCRIBE_SCRIPT".to_string(),
                    value: script,
                    error_type: ConfigErrorType::FileNotFound,
                    message: "Transcription script not found".to_string(),
                    suggestion: Some(
                        "Transcription requests will fail until the script is installed"
                            .to_string(),
                    ),
                },
            );
        }
    }
}
