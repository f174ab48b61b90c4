use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("sqlx error")]
    SQLXError(#[from] sqlx::Error),
    #[error("sqlx migration error")]
    SQLXMigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("io error")]
    IOError(#[from] std::io::Error),
    #[error("http error")]
    HTTPError(#[from] http::Error),
    #[error("http invalid header value")]
    HTTPInvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("error serializing to value")]
    SerdeJsonError(#[from] serde_json::Error),

    // input validation errors
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),
    #[error("missing query parameter: {0}")]
    MissingQueryParameter(&'static str),
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("missing path parameter: {0}")]
    MissingPathParameter(&'static str),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(&'static str),
    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),

    // upload session errors
    #[error("upload session not found: {0}")]
    SessionNotFound(String),
    #[error("chunk {0} already uploaded for session {1}")]
    DuplicateChunk(i64, String),
    #[error("computed digest did not match declared digest")]
    DigestMismatch,

    // configuration / fatal
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("database unavailable after recovery attempt")]
    DatabaseUnavailable,

    // distribution error codes
    // https://github.com/opencontainers/distribution-spec/blob/main/spec.md#error-codes
    #[error("distribution spec error")]
    DistributionSpecError(DistributionErrorCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionErrorCode {
    BlobUnknown,         // blob unknown to registry
    BlobUploadInvalid,   // blob upload invalid
    BlobUploadUnknown,   // blob upload unknown to registry
    DigestInvalid,       // provided digest did not match uploaded content
    ManifestBlobUnknown, // manifest references a manifest or blob unknown to registry
    ManifestInvalid,     // manifest invalid
    ManifestUnknown,     // manifest unknown to registry
    NameInvalid,         // invalid repository name
    NameUnknown,         // repository name not known to registry
    SizeInvalid,         // provided length did not match content length
    Unauthorized,        // authentication required
    Denied,              // request access to the resource is denied
    Unsupported,         // the operation is unsupported
    TooManyRequests,     // too many requests
}

impl DistributionErrorCode {
    fn status_code(&self) -> StatusCode {
        match self {
            DistributionErrorCode::BlobUnknown => StatusCode::NOT_FOUND,
            DistributionErrorCode::BlobUploadInvalid => StatusCode::RANGE_NOT_SATISFIABLE,
            DistributionErrorCode::BlobUploadUnknown => StatusCode::NOT_FOUND,
            DistributionErrorCode::DigestInvalid => StatusCode::BAD_REQUEST,
            DistributionErrorCode::ManifestBlobUnknown => StatusCode::BAD_REQUEST,
            DistributionErrorCode::ManifestInvalid => StatusCode::BAD_REQUEST,
            DistributionErrorCode::ManifestUnknown => StatusCode::NOT_FOUND,
            DistributionErrorCode::NameInvalid => StatusCode::BAD_REQUEST,
            DistributionErrorCode::NameUnknown => StatusCode::NOT_FOUND,
            DistributionErrorCode::SizeInvalid => StatusCode::BAD_REQUEST,
            DistributionErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            DistributionErrorCode::Denied => StatusCode::FORBIDDEN,
            DistributionErrorCode::Unsupported => StatusCode::NOT_IMPLEMENTED,
            DistributionErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            DistributionErrorCode::BlobUnknown => "BLOB_UNKNOWN",
            DistributionErrorCode::BlobUploadInvalid => "BLOB_UPLOAD_INVALID",
            DistributionErrorCode::BlobUploadUnknown => "BLOB_UPLOAD_UNKNOWN",
            DistributionErrorCode::DigestInvalid => "DIGEST_INVALID",
            DistributionErrorCode::ManifestBlobUnknown => "MANIFEST_BLOB_UNKNOWN",
            DistributionErrorCode::ManifestInvalid => "MANIFEST_INVALID",
            DistributionErrorCode::ManifestUnknown => "MANIFEST_UNKNOWN",
            DistributionErrorCode::NameInvalid => "NAME_INVALID",
            DistributionErrorCode::NameUnknown => "NAME_UNKNOWN",
            DistributionErrorCode::SizeInvalid => "SIZE_INVALID",
            DistributionErrorCode::Unauthorized => "UNAUTHORIZED",
            DistributionErrorCode::Denied => "DENIED",
            DistributionErrorCode::Unsupported => "UNSUPPORTED",
            DistributionErrorCode::TooManyRequests => "TOOMANYREQUESTS",
        }
    }
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    detail: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    errors: Vec<ErrorDetail>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Error::DistributionSpecError(dec) => (dec.status_code(), dec.code(), self.to_string()),
            Error::InvalidDigest(_) | Error::UnsupportedDigestAlgorithm(_) => {
                (StatusCode::BAD_REQUEST, "DIGEST_INVALID", self.to_string())
            }
            Error::MissingHeader(_)
            | Error::InvalidHeaderValue(_)
            | Error::MissingPathParameter(_)
            | Error::MissingQueryParameter(_) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED", self.to_string())
            }
            Error::InvalidRepositoryName(_) => {
                (StatusCode::BAD_REQUEST, "NAME_INVALID", self.to_string())
            }
            Error::SessionNotFound(_) => {
                (StatusCode::NOT_FOUND, "BLOB_UPLOAD_UNKNOWN", self.to_string())
            }
            Error::DuplicateChunk(_, _) => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                "BLOB_UPLOAD_INVALID",
                self.to_string(),
            ),
            Error::DigestMismatch => (StatusCode::BAD_REQUEST, "DIGEST_INVALID", self.to_string()),
            Error::DatabaseUnavailable => {
                tracing::error!("database unavailable, returning 503");
                (StatusCode::SERVICE_UNAVAILABLE, "UNSUPPORTED", self.to_string())
            }
            _ => {
                tracing::error!("{:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UNSUPPORTED",
                    String::from("something went wrong"),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                errors: vec![ErrorDetail {
                    code,
                    message,
                    detail: None,
                }],
            }),
        )
            .into_response()
    }
}
