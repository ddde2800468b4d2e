use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use tax_ledger_engine::traits::TaxLedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Missing required header: {0}")]
    MissingHeader(String),
    #[error("Webhook signature invalid")]
    InvalidSignature,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Event conversion error. {0}")]
    EventConversionError(#[from] crate::integrations::EventConversionError),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Remote platform error. {0}")]
    RemoteApiError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl From<shopify_sync::ShopifyApiError> for ServerError {
    fn from(e: shopify_sync::ShopifyApiError) -> Self {
        Self::RemoteApiError(e.to_string())
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHeader(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::EventConversionError(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::RemoteApiError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<TaxLedgerError> for ServerError {
    fn from(e: TaxLedgerError) -> Self {
        match e {
            TaxLedgerError::IntegrationNotFound(id) => Self::NoRecordFound(format!("Integration {id}")),
            TaxLedgerError::ImportJobNotFound(id) => Self::NoRecordFound(format!("Import job {id}")),
            e => Self::BackendError(e.to_string()),
        }
    }
}
