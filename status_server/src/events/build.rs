//! Build-completion event payloads sent by the CI server.
//!
//! ```text
//! { "name": "web", "build": { "phase": "FINISHED", "status": "SUCCESS", "number": 20 } }
//! ```

use serde_json::Value;
use thiserror::Error;

/// Payload decoded but not shaped like a build event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no `build` object")]
    MissingBuild,
}

/// Lifecycle phase of the run that produced the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Started,
    Finished,
    Other(String),
}

impl Phase {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("STARTED") => Phase::Started,
            Some("FINISHED") => Phase::Finished,
            other => Phase::Other(other.unwrap_or_default().to_string()),
        }
    }
}

/// Outcome of a finished run. Only meaningful for [`Phase::Finished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Failure,
    Other(Option<String>),
}

impl BuildStatus {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("SUCCESS") => BuildStatus::Success,
            Some("FAILURE") => BuildStatus::Failure,
            other => BuildStatus::Other(other.map(str::to_string)),
        }
    }

    /// The string persisted for terminal statuses.
    pub fn as_terminal(&self) -> Option<&'static str> {
        match self {
            BuildStatus::Success => Some("SUCCESS"),
            BuildStatus::Failure => Some("FAILURE"),
            BuildStatus::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildEvent {
    pub name: Option<String>,
    pub phase: Phase,
    pub status: BuildStatus,
    /// Raw build number, for diagnostics only.
    pub number: Option<Value>,
}

impl BuildEvent {
    /// Validate the payload shape and extract the event fields.
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        let object = payload.as_object().ok_or(PayloadError::NotAnObject)?;
        let build = object
            .get("build")
            .and_then(Value::as_object)
            .ok_or(PayloadError::MissingBuild)?;

        Ok(Self {
            name: build_name(payload).map(str::to_string),
            phase: Phase::parse(build.get("phase").and_then(Value::as_str)),
            status: BuildStatus::parse(build.get("status").and_then(Value::as_str)),
            number: build.get("number").cloned(),
        })
    }

    /// Short diagnostic summary, e.g. `build=>20, status=>SUCCESS`.
    pub fn internals(&self) -> String {
        let number = self
            .number
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        let status = match &self.status {
            BuildStatus::Other(raw) => raw.as_deref(),
            terminal => terminal.as_terminal(),
        };
        match status {
            Some(status) => format!("build=>{number}, status=>{status}"),
            None => format!("build=>{number}"),
        }
    }
}

/// The `name` field, when present and a string.
pub fn build_name(payload: &Value) -> Option<&str> {
    payload.get("name").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_finished_success() {
        let payload = json!({
            "name": "test",
            "url": "job/test/",
            "build": {
                "full_url": "http://cronus.local:3001/job/test/20/",
                "number": 20,
                "phase": "FINISHED",
                "status": "SUCCESS",
                "url": "job/test/20/"
            }
        });

        let event = BuildEvent::from_payload(&payload).unwrap();
        assert_eq!(event.name.as_deref(), Some("test"));
        assert_eq!(event.phase, Phase::Finished);
        assert_eq!(event.status, BuildStatus::Success);
        assert_eq!(event.internals(), "build=>20, status=>SUCCESS");
    }

    #[test]
    fn started_event_without_status() {
        let payload = json!({"name": "web", "build": {"phase": "STARTED", "number": 3}});
        let event = BuildEvent::from_payload(&payload).unwrap();
        assert_eq!(event.phase, Phase::Started);
        assert_eq!(event.status, BuildStatus::Other(None));
        assert_eq!(event.internals(), "build=>3");
    }

    #[test]
    fn unknown_phase_and_status_are_kept_raw() {
        let payload = json!({"name": "web", "build": {"phase": "COMPLETED", "status": "ABORTED"}});
        let event = BuildEvent::from_payload(&payload).unwrap();
        assert_eq!(event.phase, Phase::Other("COMPLETED".to_string()));
        assert_eq!(event.status, BuildStatus::Other(Some("ABORTED".to_string())));
        assert_eq!(event.status.as_terminal(), None);
    }

    #[test]
    fn rejects_non_object_payload() {
        assert_eq!(
            BuildEvent::from_payload(&json!([1, 2, 3])),
            Err(PayloadError::NotAnObject)
        );
    }

    #[test]
    fn rejects_missing_or_scalar_build() {
        assert_eq!(
            BuildEvent::from_payload(&json!({"name": "web"})),
            Err(PayloadError::MissingBuild)
        );
        assert_eq!(
            BuildEvent::from_payload(&json!({"name": "web", "build": "FINISHED"})),
            Err(PayloadError::MissingBuild)
        );
    }

    #[test]
    fn missing_name_is_tolerated() {
        let event = BuildEvent::from_payload(&json!({"build": {"phase": "FINISHED"}})).unwrap();
        assert_eq!(event.name, None);
    }
}
