use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Dataset,
    Column,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Dataset => write!(f, "dataset"),
            ResourceType::Column => write!(f, "column"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Io,
    Encode,
    Decode,
    InvalidArgument,
    Unavailable,
    DatasetAlreadyExists,
    ColumnAlreadyExists,
    DatasetNotFound,
    ColumnNotFound,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Io => "io",
            ErrorCode::Encode => "encode",
            ErrorCode::Decode => "decode",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::DatasetAlreadyExists => "dataset_already_exists",
            ErrorCode::ColumnAlreadyExists => "column_already_exists",
            ErrorCode::DatasetNotFound => "dataset_not_found",
            ErrorCode::ColumnNotFound => "column_not_found",
        }
    }

    /// HTTP status the transport layer should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidArgument => 400,
            ErrorCode::DatasetNotFound | ErrorCode::ColumnNotFound => 404,
            ErrorCode::DatasetAlreadyExists | ErrorCode::ColumnAlreadyExists => 409,
            ErrorCode::Unavailable => 503,
            ErrorCode::Io | ErrorCode::Encode | ErrorCode::Decode => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("resource unavailable: {message}")]
    Unavailable { message: String },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
}

pub type BrowseResult<T> = Result<T, BrowseError>;

impl BrowseError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        BrowseError::InvalidArgument(reason.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        BrowseError::Unavailable {
            message: message.into(),
        }
    }

    pub fn dataset_not_found(reference: impl Into<String>) -> Self {
        BrowseError::NotFound {
            resource_type: ResourceType::Dataset,
            resource_id: reference.into(),
        }
    }

    pub fn column_not_found(reference: impl Into<String>) -> Self {
        BrowseError::NotFound {
            resource_type: ResourceType::Column,
            resource_id: reference.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BrowseError::Io(_) => ErrorCode::Io,
            BrowseError::Encode(_) => ErrorCode::Encode,
            BrowseError::Decode(_) => ErrorCode::Decode,
            BrowseError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            BrowseError::Unavailable { .. } => ErrorCode::Unavailable,
            BrowseError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Dataset => ErrorCode::DatasetAlreadyExists,
                ResourceType::Column => ErrorCode::ColumnAlreadyExists,
            },
            BrowseError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Dataset => ErrorCode::DatasetNotFound,
                ResourceType::Column => ErrorCode::ColumnNotFound,
            },
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code().http_status())
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code_str(),
            message: self.to_string(),
        }
    }
}

/// Structured error payload returned to the grid widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}
