use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ResolveError;
use crate::application::store::StoreError;

/// Diagnostics attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const MISCONFIGURED: &str = "resolver_misconfigured";
    pub const STORE: &str = "store_error";
    pub const TIMEOUT: &str = "resolution_timeout";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn with_report(mut self, source: &'static str, error: &dyn StdError) -> Self {
        self.report = Some(ErrorReport::from_error(source, self.status, error));
        self
    }
}

impl From<ResolveError> for ApiError {
    fn from(error: ResolveError) -> Self {
        let api = match &error {
            ResolveError::Store {
                store,
                source: StoreError::UnknownStore { .. },
            } => Self::new(
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                "Unknown repository",
                Some(format!("repository `{store}` does not exist")),
            ),
            ResolveError::Store { .. } => Self::new(
                StatusCode::BAD_GATEWAY,
                codes::STORE,
                "Graph store query failed",
                None,
            ),
            ResolveError::Configuration(err) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::MISCONFIGURED,
                "Candidate properties are misconfigured",
                Some(err.to_string()),
            ),
            ResolveError::Timeout { .. } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                codes::TIMEOUT,
                "Resolution timed out",
                None,
            ),
            ResolveError::Worker(_) | ResolveError::Domain(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Resolution failed",
                None,
            ),
        };
        api.with_report("infra::http::lookup", &error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
