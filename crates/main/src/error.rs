use rocket::{
    http::Status,
    response::{self, Responder},
    Request,
};

/// Failures a route can end in. Each renders as an error page; none of them
/// take the process down.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The database (or another collaborator) failed; carries its message.
    #[error("{0}")]
    Remote(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    NotFound(String),
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => {
                AppError::NotFound("No such record.".to_string())
            }
            other => AppError::Remote(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> Status {
        match self {
            AppError::Remote(_) => Status::InternalServerError,
            AppError::Validation(_) => Status::BadRequest,
            AppError::Unauthorized(_) => Status::Forbidden,
            AppError::Duplicate(_) => Status::Conflict,
            AppError::NotFound(_) => Status::NotFound,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let msg = Some(self.to_string());
        let page = match &self {
            AppError::Remote(error) => {
                tracing::error!(%error, "request failed");
                ui::error_500(msg, None)
            }
            AppError::Unauthorized(_) => ui::error_403(msg, None),
            AppError::NotFound(_) => ui::error_404(msg, None),
            AppError::Validation(_) | AppError::Duplicate(_) => {
                ui::error_400(msg, None)
            }
        };
        (self.status(), page).respond_to(req)
    }
}
