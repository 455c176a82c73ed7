#[derive(Debug, thiserror::Error)]
pub enum CdrError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("openEHR error: {0}")]
    OpenEhr(#[from] openehr::OpenEhrError),
    #[error("discovery error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error(transparent)]
    Text(#[from] cdr_types::TextError),

    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read configuration file: {0}")]
    ConfigRead(std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(serde_json::Error),
    #[error("failed to serialise cache entry: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialise cache entry: {0}")]
    Deserialization(serde_json::Error),
}

impl CdrError {
    /// HTTP status the REST layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            CdrError::BadRequest(_) | CdrError::Text(_) => 400,
            CdrError::Forbidden(_) => 403,
            CdrError::NotFound(_) => 404,
            CdrError::UnprocessableEntity(_) => 422,
            CdrError::OpenEhr(_) | CdrError::Fhir(_) => 502,
            CdrError::Config(_)
            | CdrError::ConfigRead(_)
            | CdrError::ConfigParse(_)
            | CdrError::Serialization(_)
            | CdrError::Deserialization(_) => 500,
        }
    }
}

pub type CdrResult<T> = std::result::Result<T, CdrError>;
