//! Domain error types.

/// Top-level error type for vaultsim.
#[derive(Debug, thiserror::Error)]
pub enum VaultsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid backtest request field {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("empty historical dataset: {reason}")]
    EmptyDataset { reason: String },

    #[error("price source {source_name} failed: {reason}")]
    PriceSource { source_name: String, reason: String },

    #[error("no usable price for {asset_id} at {timestamp}")]
    MissingPrice { asset_id: String, timestamp: i64 },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VaultsimError {
    pub fn invalid_request(field: &str, reason: impl Into<String>) -> Self {
        VaultsimError::InvalidRequest {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn price_source(source_name: &str, reason: impl Into<String>) -> Self {
        VaultsimError::PriceSource {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&VaultsimError> for std::process::ExitCode {
    fn from(err: &VaultsimError) -> Self {
        let code: u8 = match err {
            VaultsimError::Io(_) | VaultsimError::Csv(_) => 1,
            VaultsimError::ConfigParse { .. }
            | VaultsimError::ConfigMissing { .. }
            | VaultsimError::ConfigInvalid { .. } => 2,
            VaultsimError::InvalidRequest { .. } | VaultsimError::Json(_) => 3,
            VaultsimError::EmptyDataset { .. } | VaultsimError::PriceSource { .. } => 4,
            VaultsimError::MissingPrice { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
