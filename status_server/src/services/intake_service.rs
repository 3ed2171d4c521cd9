//! Event intake: decode, mask, validate, and record terminal build events.
//!
//! Transport independent: UDP datagrams and HTTP bodies both arrive here as
//! raw bytes.

use std::sync::Arc;

use crate::events::build::{build_name, BuildEvent, BuildStatus, Phase};
use crate::models::mask::Mask;
use crate::services::store_service::{StatusStore, StoreError};

/// What processing a single message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Not JSON.
    Malformed,
    /// Dropped by the mask.
    Filtered { name: Option<String> },
    /// JSON, but not an object with a `build` object.
    InvalidShape,
    /// Any phase other than `FINISHED`.
    Started,
    /// Finished with a status other than `SUCCESS`/`FAILURE`.
    Unrecorded { status: Option<String> },
    /// The store now holds `status` for `name`.
    Recorded { name: String, status: &'static str },
}

impl IntakeOutcome {
    /// Only a store update warrants notifying the indicator.
    pub fn triggers_notification(&self) -> bool {
        matches!(self, IntakeOutcome::Recorded { .. })
    }

    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeOutcome::Malformed => "malformed",
            IntakeOutcome::Filtered { .. } => "filtered",
            IntakeOutcome::InvalidShape => "invalid_shape",
            IntakeOutcome::Started => "started",
            IntakeOutcome::Unrecorded { .. } => "unrecorded",
            IntakeOutcome::Recorded { .. } => "recorded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventIntake {
    mask: Arc<Mask>,
    store: Arc<StatusStore>,
}

impl EventIntake {
    pub fn new(mask: Mask, store: Arc<StatusStore>) -> Self {
        Self {
            mask: Arc::new(mask),
            store,
        }
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// True iff the message updated the store and a notification should follow.
    pub fn handle(&self, raw: &[u8]) -> Result<bool, StoreError> {
        self.process(raw).map(|outcome| outcome.triggers_notification())
    }

    /// Run one message through the pipeline. Only a failed store write is an
    /// error; everything else is an outcome.
    pub fn process(&self, raw: &[u8]) -> Result<IntakeOutcome, StoreError> {
        let payload: serde_json::Value = match serde_json::from_slice(raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(
                    received = %String::from_utf8_lossy(raw),
                    "Invalid JSON! (Or at least JSON wasn't able to parse it...): {e}"
                );
                return Ok(IntakeOutcome::Malformed);
            }
        };

        let name = build_name(&payload);
        if !self.mask.should_process(name) {
            tracing::debug!("Ignoring {} ({})", name.unwrap_or_default(), self.mask);
            return Ok(IntakeOutcome::Filtered {
                name: name.map(str::to_string),
            });
        }

        let event = match BuildEvent::from_payload(&payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("Pinged with an invalid payload: {e}");
                return Ok(IntakeOutcome::InvalidShape);
            }
        };
        let name = event.name.clone().unwrap_or_default();

        if event.phase != Phase::Finished {
            tracing::debug!(build = %name, "Started for {name} [{}]", event.internals());
            return Ok(IntakeOutcome::Started);
        }

        tracing::debug!(build = %name, "Got status for {name} [{}]", event.internals());
        match event.status.as_terminal() {
            Some(status) => {
                self.store.set(&name, status)?;
                crate::metrics::store_updated(status);
                tracing::info!(build = %name, status, "Recorded build status");
                Ok(IntakeOutcome::Recorded { name, status })
            }
            None => {
                tracing::warn!(build = %name, "Finished without a terminal status [{}]", event.internals());
                let status = match event.status {
                    BuildStatus::Other(raw) => raw,
                    _ => None,
                };
                Ok(IntakeOutcome::Unrecorded { status })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaskConfig;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn intake_with(regex: Option<&str>, policy: Option<&str>) -> (EventIntake, TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(StatusStore::new(dir.path().join("build_result.yml")));
        let mask = Mask::from_config(&MaskConfig {
            regex: regex.map(str::to_string),
            policy: policy.map(str::to_string),
        })
        .unwrap();
        (EventIntake::new(mask, store), dir)
    }

    fn event(name: &str, phase: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": name,
            "build": {"phase": phase, "status": status, "number": 20}
        }))
        .unwrap()
    }

    #[test]
    fn records_finished_success() {
        let (intake, _dir) = intake_with(None, None);

        let outcome = intake.process(&event("web", "FINISHED", "SUCCESS")).unwrap();

        assert_eq!(
            outcome,
            IntakeOutcome::Recorded {
                name: "web".to_string(),
                status: "SUCCESS"
            }
        );
        assert_eq!(intake.store().read()["web"], "SUCCESS");
    }

    #[test]
    fn records_finished_failure() {
        let (intake, _dir) = intake_with(None, None);

        assert!(intake.handle(&event("web", "FINISHED", "FAILURE")).unwrap());
        assert_eq!(intake.store().read()["web"], "FAILURE");
    }

    #[test]
    fn malformed_json_is_not_a_trigger() {
        let (intake, _dir) = intake_with(None, None);

        assert_eq!(intake.process(b"{not json").unwrap(), IntakeOutcome::Malformed);
        assert!(!intake.handle(b"").unwrap());
        assert!(intake.store().read().is_empty());
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let (intake, _dir) = intake_with(None, None);

        assert_eq!(
            intake.process(br#"{"name":"web"}"#).unwrap(),
            IntakeOutcome::InvalidShape
        );
        assert_eq!(
            intake.process(br#"{"name":"web","build":"FINISHED"}"#).unwrap(),
            IntakeOutcome::InvalidShape
        );
        assert_eq!(intake.process(b"[1,2,3]").unwrap(), IntakeOutcome::InvalidShape);
        assert!(intake.store().read().is_empty());
    }

    #[test]
    fn started_phase_never_touches_store() {
        let (intake, _dir) = intake_with(None, None);

        let outcome = intake.process(&event("web", "STARTED", "")).unwrap();

        assert_eq!(outcome, IntakeOutcome::Started);
        assert!(!outcome.triggers_notification());
        assert!(!intake.store().path().exists());
    }

    #[test]
    fn finished_with_unknown_status_is_not_recorded() {
        let (intake, _dir) = intake_with(None, None);

        let outcome = intake.process(&event("web", "FINISHED", "ABORTED")).unwrap();

        assert_eq!(
            outcome,
            IntakeOutcome::Unrecorded {
                status: Some("ABORTED".to_string())
            }
        );
        assert!(intake.store().read().is_empty());
    }

    #[test]
    fn exclude_mask_drops_matching_builds() {
        let (intake, _dir) = intake_with(Some("master"), Some("exclude"));

        let outcome = intake.process(&event("web-master", "FINISHED", "FAILURE")).unwrap();

        assert_eq!(
            outcome,
            IntakeOutcome::Filtered {
                name: Some("web-master".to_string())
            }
        );
        assert!(intake.store().read().is_empty());
        assert!(intake.handle(&event("web-feature", "FINISHED", "FAILURE")).unwrap());
    }

    #[test]
    fn include_mask_keeps_only_matching_builds() {
        let (intake, _dir) = intake_with(Some("^deploy-"), Some("include"));

        assert!(!intake.handle(&event("web", "FINISHED", "SUCCESS")).unwrap());
        assert!(intake.handle(&event("deploy-prod", "FINISHED", "SUCCESS")).unwrap());
        assert_eq!(intake.store().read().len(), 1);
    }

    #[test]
    fn mask_runs_before_shape_validation() {
        let (intake, _dir) = intake_with(Some("web"), Some("exclude"));

        assert_eq!(
            intake.process(br#"{"name":"web"}"#).unwrap(),
            IntakeOutcome::Filtered {
                name: Some("web".to_string())
            }
        );
    }

    #[test]
    fn repeated_event_leaves_single_entry() {
        let (intake, _dir) = intake_with(None, None);
        let raw = event("web", "FINISHED", "SUCCESS");

        assert!(intake.handle(&raw).unwrap());
        assert!(intake.handle(&raw).unwrap());

        let statuses = intake.store().read();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["web"], "SUCCESS");
    }

    #[test]
    fn store_write_failure_surfaces() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StatusStore::new(dir.path().join("missing").join("store.yml")));
        let intake = EventIntake::new(Mask::allow_all(), store);

        let err = intake.handle(&event("web", "FINISHED", "SUCCESS")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
