//! Raw schedule input as received from callers, and its validation.
//!
//! Drafts accept every field as loosely typed JSON so that each malformed
//! field produces its own message instead of one opaque decode failure.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::cadence;
use super::recipients::Recipients;
use super::report_schedule::{
    Frequency, NewReportSchedule, ReportFormat, ReportSchedule, ReportType, ScheduleStatus,
    REPORT_TITLE_MAX_LEN,
};
use super::schedule_state;
use crate::domain::errors::{DomainError, DomainResult, ValidationErrors};

/// Maximum length of a site code tag.
pub const SITE_CODE_MAX_LEN: usize = 32;

/// Unvalidated create request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleDraft {
    #[serde(default)]
    pub report_title: Option<Value>,
    #[serde(default)]
    pub report_type: Option<Value>,
    #[serde(default)]
    pub frequency: Option<Value>,
    #[serde(default)]
    pub next_run: Option<Value>,
    #[serde(default)]
    pub recipients: Option<Value>,
    #[serde(default)]
    pub format: Option<Value>,
    #[serde(default)]
    pub site_code: Option<Value>,
}

impl ScheduleDraft {
    /// Validate every field, collecting all problems before failing.
    pub fn validate(
        self,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<NewReportSchedule> {
        let mut errors = ValidationErrors::new();

        let report_title = required(&mut errors, "report_title", self.report_title.as_ref())
            .and_then(|v| title(&mut errors, v));
        let report_type = required(&mut errors, "report_type", self.report_type.as_ref())
            .and_then(|v| enum_field(&mut errors, "report_type", v, ReportType::from_str));
        let frequency = required(&mut errors, "frequency", self.frequency.as_ref())
            .and_then(|v| enum_field(&mut errors, "frequency", v, Frequency::from_str));
        let format = required(&mut errors, "format", self.format.as_ref())
            .and_then(|v| enum_field(&mut errors, "format", v, ReportFormat::from_str));
        let recipients = match non_null(self.recipients.as_ref()) {
            Some(v) => recipients(&mut errors, v),
            None => Some(Recipients::default()),
        };
        let next_run = non_null(self.next_run.as_ref()).and_then(|v| instant(&mut errors, v, now));
        let site_code = non_null(self.site_code.as_ref()).and_then(|v| site_code(&mut errors, v));
        if frequency.is_some_and(|f| f.is_on_demand()) && next_run.is_some() {
            errors.add("next_run", ON_DEMAND_NEXT_RUN);
        }

        errors.into_result()?;
        // Every `None` above recorded an error, so this only guards the types.
        let (Some(report_title), Some(report_type), Some(frequency), Some(format), Some(recipients)) =
            (report_title, report_type, frequency, format, recipients)
        else {
            return Err(DomainError::invalid("non_field_errors", "Incomplete schedule."));
        };

        Ok(NewReportSchedule {
            report_title,
            report_type,
            frequency,
            next_run,
            recipients,
            format,
            site_code,
            created_by,
        })
    }
}

/// Unvalidated partial update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulePatchDraft {
    #[serde(default)]
    pub report_title: Option<Value>,
    #[serde(default)]
    pub report_type: Option<Value>,
    #[serde(default)]
    pub frequency: Option<Value>,
    #[serde(default)]
    pub next_run: Option<Value>,
    #[serde(default)]
    pub recipients: Option<Value>,
    #[serde(default)]
    pub format: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub site_code: Option<Value>,
}

/// Requested status change in a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Activate,
    Pause,
}

/// Validated partial update.
#[derive(Debug, Clone, Default)]
pub struct SchedulePatch {
    pub report_title: Option<String>,
    pub report_type: Option<ReportType>,
    pub frequency: Option<Frequency>,
    pub next_run: Option<DateTime<Utc>>,
    pub recipients: Option<Recipients>,
    pub format: Option<ReportFormat>,
    pub status: Option<StatusChange>,
    /// `Some(None)` clears the tag.
    pub site_code: Option<Option<String>>,
}

impl SchedulePatchDraft {
    pub fn validate(self, now: DateTime<Utc>) -> DomainResult<SchedulePatch> {
        let mut errors = ValidationErrors::new();

        let patch = SchedulePatch {
            report_title: self
                .report_title
                .as_ref()
                .and_then(|v| title(&mut errors, v)),
            report_type: self
                .report_type
                .as_ref()
                .and_then(|v| enum_field(&mut errors, "report_type", v, ReportType::from_str)),
            frequency: self
                .frequency
                .as_ref()
                .and_then(|v| enum_field(&mut errors, "frequency", v, Frequency::from_str)),
            next_run: non_null(self.next_run.as_ref()).and_then(|v| instant(&mut errors, v, now)),
            recipients: self
                .recipients
                .as_ref()
                .and_then(|v| recipients(&mut errors, v)),
            format: self
                .format
                .as_ref()
                .and_then(|v| enum_field(&mut errors, "format", v, ReportFormat::from_str)),
            status: self.status.as_ref().and_then(|v| status_change(&mut errors, v)),
            site_code: self
                .site_code
                .as_ref()
                .map(|v| non_null(Some(v)).and_then(|v| site_code(&mut errors, v))),
        };

        errors.into_result()?;
        Ok(patch)
    }
}

impl SchedulePatch {
    pub fn is_empty(&self) -> bool {
        self.report_title.is_none()
            && self.report_type.is_none()
            && self.frequency.is_none()
            && self.next_run.is_none()
            && self.recipients.is_none()
            && self.format.is_none()
            && self.status.is_none()
            && self.site_code.is_none()
    }

    /// Apply the patch to a stored schedule.
    ///
    /// A frequency change on an active schedule recomputes `next_run` from
    /// `now` unless the patch also pins `next_run`. Setting status to active
    /// on a failed schedule is the admin reset.
    pub fn apply(self, schedule: &mut ReportSchedule, now: DateTime<Utc>) -> DomainResult<()> {
        if self.next_run.is_some() && self.frequency.unwrap_or(schedule.frequency).is_on_demand() {
            return Err(DomainError::invalid("next_run", ON_DEMAND_NEXT_RUN));
        }
        let frequency_changed = self.frequency.is_some_and(|f| f != schedule.frequency);

        if let Some(report_title) = self.report_title {
            schedule.report_title = report_title;
        }
        if let Some(report_type) = self.report_type {
            schedule.report_type = report_type;
        }
        if let Some(frequency) = self.frequency {
            schedule.frequency = frequency;
        }
        if let Some(recipients) = self.recipients {
            schedule.recipients = recipients;
        }
        if let Some(format) = self.format {
            schedule.format = format;
        }
        if let Some(site_code) = self.site_code {
            schedule.site_code = site_code;
        }

        match self.status {
            Some(StatusChange::Pause) => schedule_state::pause(schedule, now)?,
            Some(StatusChange::Activate) if schedule.status == ScheduleStatus::Failed => {
                schedule_state::reset(schedule, now);
            }
            Some(StatusChange::Activate) if schedule.status == ScheduleStatus::Paused => {
                schedule_state::resume(schedule, now);
            }
            _ => {}
        }

        if schedule.frequency.is_on_demand() {
            schedule.next_run = cadence::never();
        } else if let Some(next_run) = self.next_run {
            schedule.next_run = next_run;
        } else if frequency_changed && schedule.status == ScheduleStatus::Active {
            schedule.next_run = cadence::next(schedule.frequency, now);
        } else if cadence::is_never(schedule.next_run) {
            // Leaving on_demand while paused or failed: give it a phase.
            schedule.next_run = cadence::next(schedule.frequency, now);
        }

        schedule.updated_at = now;
        Ok(())
    }
}

const ON_DEMAND_NEXT_RUN: &str = "On-demand schedules run only when triggered and take no next_run.";

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn required<'a>(errors: &mut ValidationErrors, field: &str, value: Option<&'a Value>) -> Option<&'a Value> {
    let value = non_null(value);
    if value.is_none() {
        errors.add(field, "This field is required.");
    }
    value
}

fn string<'a>(errors: &mut ValidationErrors, field: &str, value: &'a Value) -> Option<&'a str> {
    let s = value.as_str();
    if s.is_none() {
        errors.add(field, "Expected a string.");
    }
    s
}

fn title(errors: &mut ValidationErrors, value: &Value) -> Option<String> {
    let raw = string(errors, "report_title", value)?.trim();
    if raw.is_empty() {
        errors.add("report_title", "This field may not be blank.");
        return None;
    }
    if raw.chars().count() > REPORT_TITLE_MAX_LEN {
        errors.add(
            "report_title",
            format!("Ensure this field has no more than {REPORT_TITLE_MAX_LEN} characters."),
        );
        return None;
    }
    Some(raw.to_string())
}

fn enum_field<T>(
    errors: &mut ValidationErrors,
    field: &str,
    value: &Value,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = string(errors, field, value)?;
    let parsed = parse(raw);
    if parsed.is_none() {
        errors.add(field, format!("\"{raw}\" is not a valid choice."));
    }
    parsed
}

fn instant(errors: &mut ValidationErrors, value: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = string(errors, "next_run", value)?;
    let Ok(parsed) = DateTime::parse_from_rfc3339(raw.trim()) else {
        errors.add("next_run", "Datetime has wrong format. Use RFC 3339.");
        return None;
    };
    let parsed = parsed.with_timezone(&Utc);
    if parsed <= now {
        errors.add("next_run", "next_run must be in the future.");
        return None;
    }
    if cadence::is_never(parsed) {
        errors.add("next_run", "next_run is out of range.");
        return None;
    }
    Some(parsed)
}

fn recipients(errors: &mut ValidationErrors, value: &Value) -> Option<Recipients> {
    let Some(items) = value.as_array() else {
        errors.add("recipients", "Expected a list of email addresses.");
        return None;
    };
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(s) => entries.push(s),
            None => {
                errors.add("recipients", "Each recipient must be a string.");
                return None;
            }
        }
    }
    match Recipients::parse(entries) {
        Ok(recipients) => Some(recipients),
        Err(problems) => {
            for problem in problems {
                errors.add("recipients", problem);
            }
            None
        }
    }
}

fn site_code(errors: &mut ValidationErrors, value: &Value) -> Option<String> {
    let raw = string(errors, "site_code", value)?.trim();
    if raw.chars().count() > SITE_CODE_MAX_LEN {
        errors.add(
            "site_code",
            format!("Ensure this field has no more than {SITE_CODE_MAX_LEN} characters."),
        );
        return None;
    }
    (!raw.is_empty()).then(|| raw.to_string())
}

fn status_change(errors: &mut ValidationErrors, value: &Value) -> Option<StatusChange> {
    match string(errors, "status", value)? {
        "active" => Some(StatusChange::Activate),
        "paused" => Some(StatusChange::Pause),
        other => {
            errors.add(
                "status",
                format!("\"{other}\" is not a valid choice. Use \"active\" or \"paused\"."),
            );
            None
        }
    }
}
