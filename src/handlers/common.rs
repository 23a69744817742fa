use crate::errors::ServiceError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use validator::Validate;

/// JSON body that has been deserialized and then validated.
///
/// Malformed JSON and wrong field types become a 400 `BadRequest`; failed
/// `validator` rules become a 400 with per-field details.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ServiceError::BadRequest(rejection.body_text()))?;
        validate_input(&value)?;
        Ok(Self(value))
    }
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(crate::ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Clamp raw `page`/`limit` query values to `page >= 1` and `1 <= limit <= max_limit`.
pub fn clamp_page(page: u64, limit: u64, max_limit: u64) -> (u64, u64) {
    (page.max(1), limit.clamp(1, max_limit.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, routing::post, Router};
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize, Validate)]
    struct NamePayload {
        #[validate(length(min = 1, max = 10))]
        name: String,
    }

    async fn echo(ValidatedJson(payload): ValidatedJson<NamePayload>) -> String {
        payload.name
    }

    async fn send(body: &'static str) -> StatusCode {
        Router::new()
            .route("/", post(echo))
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn valid_body_passes_through() {
        assert_eq!(send(r#"{"name":"ok"}"#).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_and_invalid_bodies_are_bad_requests() {
        assert_eq!(send("{not json").await, StatusCode::BAD_REQUEST);
        assert_eq!(send(r#"{"name":42}"#).await, StatusCode::BAD_REQUEST);
        assert_eq!(send(r#"{"name":""}"#).await, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn page_parameters_are_clamped() {
        assert_eq!(clamp_page(0, 0, 100), (1, 1));
        assert_eq!(clamp_page(3, 500, 100), (3, 100));
        assert_eq!(clamp_page(2, 25, 100), (2, 25));
    }
}
