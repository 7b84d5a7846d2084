use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConflateError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJsonError(#[from] geojson::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Field '{field}' not found in layer '{layer}'")]
    FieldNotFoundError { layer: String, field: String },

    #[error("Layer '{layer}' has {found} geometry, expected {expected}")]
    GeometryTypeError {
        layer: String,
        expected: String,
        found: String,
    },

    #[error("Schema mismatch in layer '{layer}': {details}")]
    SchemaMismatchError { layer: String, details: String },

    #[error("No layers to merge")]
    EmptyMergeError,

    #[error("Processing error in {stage}: {details}")]
    ProcessingError { stage: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Data,
    Configuration,
    Geometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConflateError::IoError(_) => ErrorCategory::Io,
            ConflateError::SerializationError(_) | ConflateError::GeoJsonError(_) => {
                ErrorCategory::Data
            }
            ConflateError::ConfigError { .. }
            | ConflateError::MissingConfigError { .. }
            | ConflateError::InvalidConfigValueError { .. }
            | ConflateError::ConfigValidationError { .. }
            | ConflateError::FieldNotFoundError { .. } => ErrorCategory::Configuration,
            ConflateError::GeometryTypeError { .. }
            | ConflateError::SchemaMismatchError { .. }
            | ConflateError::EmptyMergeError
            | ConflateError::ProcessingError { .. } => ErrorCategory::Geometry,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Io => ErrorSeverity::Critical,
            ErrorCategory::Data => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Geometry => ErrorSeverity::High,
        }
    }

    /// 設定錯誤在任何幾何運算開始前就會被拒絕
    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
            || matches!(self, ConflateError::GeometryTypeError { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ConflateError::IoError(_) => {
                "Check that the input files exist and the output directory is writable".to_string()
            }
            ConflateError::SerializationError(_) | ConflateError::GeoJsonError(_) => {
                "Make sure the input layers are valid GeoJSON FeatureCollections".to_string()
            }
            ConflateError::MissingConfigError { field } => {
                format!("Set '{}' in the configuration file or the options directory", field)
            }
            ConflateError::FieldNotFoundError { layer, .. } => {
                format!("Pick one of the fields available in layer '{}'", layer)
            }
            ConflateError::InvalidConfigValueError { field, .. }
            | ConflateError::ConfigValidationError { field, .. } => {
                format!("Fix the value of '{}' and run again", field)
            }
            ConflateError::ConfigError { .. } => "Review the configuration file".to_string(),
            ConflateError::GeometryTypeError { expected, .. } => {
                format!("Provide a layer with {} geometry", expected)
            }
            ConflateError::SchemaMismatchError { .. } | ConflateError::EmptyMergeError => {
                "Make sure every merged layer shares the same field schema".to_string()
            }
            ConflateError::ProcessingError { .. } => {
                "Run again with --verbose to see the failing step".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Io => format!("Could not read or write a file: {}", self),
            ErrorCategory::Data => format!("Input data could not be parsed: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Geometry => format!("Conflation failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConflateError>;
