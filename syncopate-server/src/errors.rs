use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use syncopate_core::{QueueError, RoomError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Room(error) => match error {
                RoomError::NotFound(_) => StatusCode::NOT_FOUND,
                RoomError::Inactive => StatusCode::GONE,
                RoomError::AtCapacity => StatusCode::CONFLICT,
                RoomError::ProviderNotFound(_) => StatusCode::BAD_REQUEST,
                RoomError::Queue(queue) => match queue {
                    QueueError::EntryNotFound(_) => StatusCode::NOT_FOUND,
                    QueueError::QueueFull(_) => StatusCode::CONFLICT,
                    QueueError::DuplicateEntry { .. } => StatusCode::CONFLICT,
                },
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}
