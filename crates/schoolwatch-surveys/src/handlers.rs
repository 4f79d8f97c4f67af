use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::service::SubmissionService;
use crate::submission::SurveySubmission;

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_survey,
    ),
    components(schemas(
        MessageResponse,
        SurveySubmission,
    )),
    tags(
        (name = "surveys", description = "School facility survey intake")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct SurveyState {
    pub submissions: Arc<SubmissionService>,
}

pub fn configure_routes() -> Router<Arc<SurveyState>> {
    Router::new().route("/submitData", post(submit_survey))
}

/// Outcome message returned by every response of the submit endpoint.
/// The three message strings are a wire contract with the field app.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Data received and inserted into database successfully")]
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_owned(),
        })
    }
}

/// Accept one school facility survey and forward it to the database
#[utoipa::path(
    post,
    path = "/submitData",
    tag = "surveys",
    request_body = SurveySubmission,
    responses(
        (status = 200, description = "Submission stored", body = MessageResponse),
        (status = 400, description = "Request body absent or empty", body = MessageResponse),
        (status = 500, description = "Submission could not be stored", body = MessageResponse)
    )
)]
async fn submit_survey(
    State(state): State<Arc<SurveyState>>,
    body: Bytes,
) -> (StatusCode, Json<MessageResponse>) {
    let Some(document) = parse_document(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            MessageResponse::new("Data not provided"),
        );
    };

    let submission = match SurveySubmission::from_document(document) {
        Ok(submission) => submission,
        Err(e) => {
            error!("Error inserting data into database: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                MessageResponse::new("Error inserting data into database"),
            );
        }
    };

    match state.submissions.submit(&submission).await {
        Ok(()) => {
            info!("Data inserted successfully");
            (
                StatusCode::OK,
                MessageResponse::new("Data received and inserted into database successfully"),
            )
        }
        Err(e) => {
            error!("Error inserting data into database: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                MessageResponse::new("Error inserting data into database"),
            )
        }
    }
}

/// A body counts as provided only if it parses as JSON and is neither
/// `null` nor an empty object.
fn parse_document(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    let document: Value = serde_json::from_slice(body).ok()?;
    match &document {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        _ => Some(document),
    }
}
