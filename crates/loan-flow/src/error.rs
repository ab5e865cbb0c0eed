use crate::config::ConfigError;
use crate::session::SessionError;
use crate::tasks::TaskMonitorError;
use crate::telemetry::TelemetryError;
use crate::workflow::NavigationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Session(SessionError),
    UnknownApplication(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Session(SessionError::Navigation(NavigationError::Validation { .. })) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Session(SessionError::Navigation(NavigationError::AccessDenied {
                ..
            })) => StatusCode::FORBIDDEN,
            AppError::Session(SessionError::Navigation(NavigationError::UnknownSubStage {
                ..
            }))
            | AppError::Session(SessionError::UnknownTask(_))
            | AppError::UnknownApplication(_) => StatusCode::NOT_FOUND,
            AppError::Session(SessionError::Task(TaskMonitorError::Offline { .. })) => {
                StatusCode::CONFLICT
            }
            AppError::Session(SessionError::Storage(_))
            | AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Session(SessionError::Navigation(NavigationError::Validation { .. })) => {
                "validation"
            }
            AppError::Session(SessionError::Navigation(NavigationError::AccessDenied {
                ..
            })) => "access_denied",
            AppError::Session(SessionError::Task(_)) => "offline",
            AppError::Session(SessionError::Navigation(NavigationError::UnknownSubStage {
                ..
            }))
            | AppError::Session(SessionError::UnknownTask(_))
            | AppError::UnknownApplication(_) => "not_found",
            _ => "internal",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Session(err) => write!(f, "{}", err),
            AppError::UnknownApplication(id) => write!(f, "no open session for application {}", id),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Session(err) => Some(err),
            AppError::UnknownApplication(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({ "error": self.to_string(), "kind": self.kind() });

        if let AppError::Session(SessionError::Navigation(NavigationError::Validation {
            missing,
            ..
        })) = &self
        {
            body["missingFields"] = json!(missing);
        }

        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<NavigationError> for AppError {
    fn from(value: NavigationError) -> Self {
        Self::Session(SessionError::Navigation(value))
    }
}
