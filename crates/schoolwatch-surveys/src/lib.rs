//! School facility survey intake: the typed submission record, the
//! stored-procedure mapper, and the HTTP endpoint.

pub mod handlers;
pub mod service;
pub mod submission;

pub use handlers::{configure_routes, ApiDoc, MessageResponse, SurveyState};
pub use service::{SubmissionError, SubmissionService, INDICATORS_PROCEDURE};
pub use submission::{ParameterKind, SurveySubmission, PARAMETERS};
