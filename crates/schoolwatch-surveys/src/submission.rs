//! Typed survey submission record and the destination parameter table.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::Value as DbValue;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::service::SubmissionError;

/// How a destination parameter is typed when bound to the procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Text,
    Number,
    Timestamp,
}

/// Destination parameters of the stored procedure, in signature order.
///
/// [`SurveySubmission::bind_values`] must produce exactly one value per
/// entry, in this order. Each parameter is bound from the request field of
/// the same name.
pub const PARAMETERS: &[(&str, ParameterKind)] = &[
    ("SCHOOL_CODE", ParameterKind::Text),
    ("SCHOOL_REG_STATUS", ParameterKind::Text),
    ("REGISTRATION_EXP_DATE", ParameterKind::Timestamp),
    ("NO_OF_CAMPUSES", ParameterKind::Number),
    ("TOTAL_PROG_STUDENTS", ParameterKind::Number),
    ("PRESENT_PROG_STUDENTS", ParameterKind::Number),
    ("TOTAL_STUDENTS", ParameterKind::Number),
    ("TOTAL_ROOMS", ParameterKind::Number),
    ("NO_OF_CLASSROOMS", ParameterKind::Number),
    ("NO_OF_IMPROPER_ROOMS", ParameterKind::Number),
    ("TOTAL_FURNITURE", ParameterKind::Number),
    ("TOTAL_TOILETS", ParameterKind::Number),
    ("FUNCTIONAL_TOILETS", ParameterKind::Number),
    ("TOTAL_DRINKING_WATER_POINTS", ParameterKind::Number),
    ("FUNCTIONAL_DRINKING_WATER_POINTS", ParameterKind::Number),
    ("BUILDING_FITNESS_CERTIFICATE", ParameterKind::Text),
    ("S_METAL_DETECTOR", ParameterKind::Text),
    ("S_GUARDS", ParameterKind::Text),
    ("S_GUARD_WITH_WEAPON", ParameterKind::Text),
    ("S_CAMERA", ParameterKind::Text),
    ("S_FENCE_WALL", ParameterKind::Text),
    ("S_BOUNDARY_WALL", ParameterKind::Text),
    ("BC_SATISFACTORY", ParameterKind::Text),
    ("BC_MAINTENANCE_REQUIRED", ParameterKind::Text),
    ("BC_UNSAFE_PARTITION_WALL", ParameterKind::Text),
    ("BC_ROOF_REEDS", ParameterKind::Text),
    ("BC_DANGEROUS_BUILDING", ParameterKind::Text),
    ("PEF_BOARD_AT_CAMPUS", ParameterKind::Text),
    ("CC_PRINCIPAL_OFFICES", ParameterKind::Text),
    ("CC_CLASSES", ParameterKind::Text),
    ("CC_TOILETS", ParameterKind::Text),
    ("CC_STAFF_ROOMS", ParameterKind::Text),
    ("CC_COURTYARD", ParameterKind::Text),
    ("CC_WATER_POINTS", ParameterKind::Text),
    ("SRM_TEACHER_SALARY_REGISTER", ParameterKind::Text),
    ("SRM_STUDENT_ATTENDANCE_REGISTER", ParameterKind::Text),
    ("SRM_ADMISSION_WITHDRAWAL_REGISTER", ParameterKind::Text),
    ("ELECTRIC_WIRING_SAFE", ParameterKind::Text),
    ("CLASSES_WITHOUT_ROOM", ParameterKind::Text),
    ("CONGESTED_CLASS", ParameterKind::Text),
    ("OVERCROWDED_CLASS", ParameterKind::Text),
    ("COMBINED_CLASS", ParameterKind::Text),
    ("QAT_RESULT_DISPLAY", ParameterKind::Text),
    ("UNAUTHORIZED_BUILDING_SHIFTING", ParameterKind::Text),
    ("MONEY_CHARGING", ParameterKind::Text),
    ("CORPORAL_PUNISHMENT", ParameterKind::Text),
    ("RESIDENCE_IN_SCHOOL", ParameterKind::Text),
    ("HARASSMENT", ParameterKind::Text),
    ("SCHOOL_TIMING", ParameterKind::Text),
    ("GOVT_TIMINGS_FOLLOWED", ParameterKind::Text),
];

/// One school's survey answers, as submitted by the field app.
///
/// Every field is optional: an omitted answer binds SQL NULL instead of
/// failing the request. Numeric counts accept JSON numbers or numeric
/// strings; indicator fields are short codes passed through uninterpreted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SurveySubmission {
    /// Code identifying the school. Older clients send this as `SCHOOLCODE`.
    #[serde(default, alias = "SCHOOLCODE", deserialize_with = "lenient_text")]
    #[schema(example = "SW-34-0117")]
    pub school_code: Option<String>,

    /// Registration status of the school
    #[serde(default, deserialize_with = "lenient_text")]
    #[schema(example = "REGISTERED")]
    pub school_reg_status: Option<String>,

    /// Expiry of the school's registration (RFC 3339 or `YYYY-MM-DD`)
    #[serde(default, deserialize_with = "expiry_date")]
    #[schema(value_type = Option<String>, format = DateTime, example = "2024-03-15T00:00:00Z")]
    pub registration_exp_date: Option<DateTime<Utc>>,

    // Campus and headcount figures
    #[serde(default, deserialize_with = "lenient_number")]
    pub no_of_campuses: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_prog_students: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub present_prog_students: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_students: Option<f64>,

    // Room and facility counts
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_rooms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub no_of_classrooms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub no_of_improper_rooms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_furniture: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_toilets: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub functional_toilets: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_drinking_water_points: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub functional_drinking_water_points: Option<f64>,

    /// Whether the campus holds a building fitness certificate
    #[serde(default, deserialize_with = "lenient_text")]
    pub building_fitness_certificate: Option<String>,

    // Security arrangements at the gate and perimeter
    #[serde(default, deserialize_with = "lenient_text")]
    pub s_metal_detector: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub s_guards: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub s_guard_with_weapon: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub s_camera: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub s_fence_wall: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub s_boundary_wall: Option<String>,

    // Building condition
    #[serde(default, deserialize_with = "lenient_text")]
    pub bc_satisfactory: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub bc_maintenance_required: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub bc_unsafe_partition_wall: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub bc_roof_reeds: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub bc_dangerous_building: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub pef_board_at_campus: Option<String>,

    // Cleanliness of campus areas
    #[serde(default, deserialize_with = "lenient_text")]
    pub cc_principal_offices: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cc_classes: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cc_toilets: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cc_staff_rooms: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cc_courtyard: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cc_water_points: Option<String>,

    // School record maintenance registers
    #[serde(default, deserialize_with = "lenient_text")]
    pub srm_teacher_salary_register: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub srm_student_attendance_register: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub srm_admission_withdrawal_register: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub electric_wiring_safe: Option<String>,

    // Classroom utilization
    #[serde(default, deserialize_with = "lenient_text")]
    pub classes_without_room: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub congested_class: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub overcrowded_class: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub combined_class: Option<String>,

    // Compliance and conduct indicators
    #[serde(default, deserialize_with = "lenient_text")]
    pub qat_result_display: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub unauthorized_building_shifting: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub money_charging: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub corporal_punishment: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub residence_in_school: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub harassment: Option<String>,

    // Timings
    #[serde(default, deserialize_with = "lenient_text")]
    pub school_timing: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub govt_timings_followed: Option<String>,
}

impl SurveySubmission {
    /// Coerce one request document into a typed submission.
    ///
    /// Unknown fields are ignored; known fields that fail coercion abort the
    /// submission with the offending field named in the error.
    pub fn from_document(document: Value) -> Result<Self, SubmissionError> {
        serde_path_to_error::deserialize(document).map_err(|e| {
            let field = e.path().to_string();
            SubmissionError::Coercion {
                field,
                reason: e.into_inner().to_string(),
            }
        })
    }

    /// Bound parameter values for one procedure invocation, in the exact
    /// order of [`PARAMETERS`]. Absent fields bind SQL NULL.
    pub fn bind_values(&self) -> Vec<DbValue> {
        vec![
            self.school_code.clone().into(),
            self.school_reg_status.clone().into(),
            self.registration_exp_date.into(),
            self.no_of_campuses.into(),
            self.total_prog_students.into(),
            self.present_prog_students.into(),
            self.total_students.into(),
            self.total_rooms.into(),
            self.no_of_classrooms.into(),
            self.no_of_improper_rooms.into(),
            self.total_furniture.into(),
            self.total_toilets.into(),
            self.functional_toilets.into(),
            self.total_drinking_water_points.into(),
            self.functional_drinking_water_points.into(),
            self.building_fitness_certificate.clone().into(),
            self.s_metal_detector.clone().into(),
            self.s_guards.clone().into(),
            self.s_guard_with_weapon.clone().into(),
            self.s_camera.clone().into(),
            self.s_fence_wall.clone().into(),
            self.s_boundary_wall.clone().into(),
            self.bc_satisfactory.clone().into(),
            self.bc_maintenance_required.clone().into(),
            self.bc_unsafe_partition_wall.clone().into(),
            self.bc_roof_reeds.clone().into(),
            self.bc_dangerous_building.clone().into(),
            self.pef_board_at_campus.clone().into(),
            self.cc_principal_offices.clone().into(),
            self.cc_classes.clone().into(),
            self.cc_toilets.clone().into(),
            self.cc_staff_rooms.clone().into(),
            self.cc_courtyard.clone().into(),
            self.cc_water_points.clone().into(),
            self.srm_teacher_salary_register.clone().into(),
            self.srm_student_attendance_register.clone().into(),
            self.srm_admission_withdrawal_register.clone().into(),
            self.electric_wiring_safe.clone().into(),
            self.classes_without_room.clone().into(),
            self.congested_class.clone().into(),
            self.overcrowded_class.clone().into(),
            self.combined_class.clone().into(),
            self.qat_result_display.clone().into(),
            self.unauthorized_building_shifting.clone().into(),
            self.money_charging.clone().into(),
            self.corporal_punishment.clone().into(),
            self.residence_in_school.clone().into(),
            self.harassment.clone().into(),
            self.school_timing.clone().into(),
            self.govt_timings_followed.clone().into(),
        ]
    }
}

/// Accept any JSON scalar as text; the procedure's text parameters carry
/// short categorical codes that some clients send as bare numbers.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a text value, found {other}"
        ))),
    }
}

/// Accept a JSON number or a numeric string. Empty strings coerce to NULL
/// rather than zero.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| {
            de::Error::custom(format!("{n} is not representable as a double"))
        }),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("{s:?} is not a number")))
        }
        Some(other) => Err(de::Error::custom(format!(
            "expected a number, found {other}"
        ))),
    }
}

fn expiry_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_expiry_date(&s).map(Some).map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!(
            "expected a date string, found {other}"
        ))),
    }
}

/// Parse the registration expiry timestamp. Unparseable input is an error,
/// never a silent default.
fn parse_expiry_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(format!("unrecognized date/time format: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    /// A document touching every destination parameter, with a distinct
    /// value per field, plus the bind values it should produce.
    fn fully_populated_document() -> (Value, Vec<DbValue>) {
        let mut doc = serde_json::Map::new();
        let mut expected = Vec::new();
        for (index, (name, kind)) in PARAMETERS.iter().enumerate() {
            match kind {
                ParameterKind::Text => {
                    let text = format!("v-{name}");
                    doc.insert((*name).to_owned(), json!(text));
                    expected.push(DbValue::from(Some(format!("v-{name}"))));
                }
                ParameterKind::Number => {
                    let number = index as f64 + 0.5;
                    doc.insert((*name).to_owned(), json!(number));
                    expected.push(DbValue::from(Some(number)));
                }
                ParameterKind::Timestamp => {
                    doc.insert((*name).to_owned(), json!("2024-03-15T00:00:00Z"));
                    let timestamp = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
                    expected.push(DbValue::from(Some(timestamp)));
                }
            }
        }
        (Value::Object(doc), expected)
    }

    #[test]
    fn parameter_table_has_no_duplicates() {
        let mut names: Vec<&str> = PARAMETERS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PARAMETERS.len());
        assert_eq!(PARAMETERS.len(), 50);
    }

    #[test]
    fn binds_every_parameter_once_from_the_same_named_field() {
        let (doc, expected) = fully_populated_document();
        let submission = SurveySubmission::from_document(doc).unwrap();
        let values = submission.bind_values();
        assert_eq!(values.len(), PARAMETERS.len());
        assert_eq!(values, expected);
    }

    #[test]
    fn omitted_fields_bind_null() {
        let submission =
            SurveySubmission::from_document(json!({ "SCHOOL_CODE": "SW-0001" })).unwrap();
        let values = submission.bind_values();
        assert_eq!(values.len(), PARAMETERS.len());
        assert_eq!(values[0], DbValue::from(Some("SW-0001".to_owned())));
        assert_eq!(values[1], DbValue::from(Option::<String>::None));
        assert_eq!(values[3], DbValue::from(Option::<f64>::None));
    }

    #[test]
    fn accepts_legacy_schoolcode_spelling() {
        let submission =
            SurveySubmission::from_document(json!({ "SCHOOLCODE": "SW-0042" })).unwrap();
        assert_eq!(submission.school_code.as_deref(), Some("SW-0042"));
    }

    #[test]
    fn numeric_strings_coerce_to_numbers() {
        let submission = SurveySubmission::from_document(json!({
            "TOTAL_STUDENTS": "420",
            "TOTAL_ROOMS": 18,
            "NO_OF_CLASSROOMS": ""
        }))
        .unwrap();
        assert_eq!(submission.total_students, Some(420.0));
        assert_eq!(submission.total_rooms, Some(18.0));
        assert_eq!(submission.no_of_classrooms, None);
    }

    #[test]
    fn negative_counts_pass_through_unchecked() {
        let submission =
            SurveySubmission::from_document(json!({ "TOTAL_STUDENTS": -5 })).unwrap();
        assert_eq!(submission.total_students, Some(-5.0));
    }

    #[test]
    fn non_numeric_count_is_a_coercion_error() {
        let err = SurveySubmission::from_document(json!({ "TOTAL_STUDENTS": "a lot" }))
            .unwrap_err();
        match err {
            SubmissionError::Coercion { field, .. } => assert_eq!(field, "TOTAL_STUDENTS"),
            other => panic!("expected a coercion error, got {other:?}"),
        }
    }

    #[test]
    fn rfc3339_expiry_date_parses() {
        let submission = SurveySubmission::from_document(
            json!({ "REGISTRATION_EXP_DATE": "2024-03-15T00:00:00Z" }),
        )
        .unwrap();
        assert_eq!(
            submission.registration_exp_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn bare_date_parses_as_midnight_utc() {
        let submission =
            SurveySubmission::from_document(json!({ "REGISTRATION_EXP_DATE": "2025-12-31" }))
                .unwrap();
        assert_eq!(
            submission.registration_exp_date,
            Some(Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn unparseable_expiry_date_is_a_coercion_error() {
        let err = SurveySubmission::from_document(
            json!({ "REGISTRATION_EXP_DATE": "next spring" }),
        )
        .unwrap_err();
        match err {
            SubmissionError::Coercion { field, .. } => {
                assert_eq!(field, "REGISTRATION_EXP_DATE");
            }
            other => panic!("expected a coercion error, got {other:?}"),
        }
    }

    #[test]
    fn numeric_indicator_codes_are_stringified() {
        let submission =
            SurveySubmission::from_document(json!({ "S_CAMERA": 1, "HARASSMENT": "N" }))
                .unwrap();
        assert_eq!(submission.s_camera.as_deref(), Some("1"));
        assert_eq!(submission.harassment.as_deref(), Some("N"));
    }
}
