use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("{0}")]
    InvalidDuration(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Invalid campaign state: {0}")]
    InvalidState(String),

    #[error("Campaign expired: {0}")]
    CampaignExpired(String),

    // Must not reveal whether the campaign exists or who owns it.
    #[error("Not permitted")]
    Unauthorized,

    #[error("Campaign not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Campaign cannot be deleted: {0}")]
    DeleteBlocked(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CampaignError {
    /// Stable machine-readable code for the request layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange(_) => "invalid_range",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::PaymentRequired(_) => "payment_required",
            Self::InvalidState(_) => "invalid_state",
            Self::CampaignExpired(_) => "campaign_expired",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Validation(_) => "validation",
            Self::DeleteBlocked(_) => "delete_blocked",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Caller-correctable rejections. These must never be retried.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_) | Self::Config(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }
}
