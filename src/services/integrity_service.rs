use crate::database::Store;
use crate::dto::public_dto::RecordEventResponse;
use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::event::{Event, TAB_SWITCH};
use crate::utils::time::Clock;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct IntegrityService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl IntegrityService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Appends an event whatever the attempt's status, then re-evaluates the
    /// flag for tab switches.
    pub async fn record(
        &self,
        attempt_id: Uuid,
        event_type: &str,
        event_data: JsonValue,
    ) -> Result<RecordEventResponse> {
        let event_type = event_type.trim();
        if event_type.is_empty() {
            return Err(Error::BadRequest("event_type is required".to_string()));
        }
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;

        let event = Event {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            event_type: event_type.to_string(),
            event_data: if event_data.is_null() {
                JsonValue::Object(Default::default())
            } else {
                event_data
            },
            created_at: self.clock.now(),
        };
        let appended = self.store.append_event(&event).await?;

        let flagged = if event_type == TAB_SWITCH {
            self.maybe_escalate(&attempt, appended.type_total).await?
        } else {
            attempt.flagged
        };

        Ok(RecordEventResponse {
            event: appended.event,
            flagged,
        })
    }

    /// One-way latch: flags the attempt once its tab switch total reaches the
    /// test's threshold, provided the test blocks tab switching. Returns the
    /// attempt's flag after the check.
    pub async fn maybe_escalate(&self, attempt: &Attempt, tab_switch_total: i64) -> Result<bool> {
        if attempt.flagged {
            return Ok(true);
        }
        let assignment = self
            .store
            .get_assignment(attempt.assignment_id)
            .await?
            .ok_or_else(|| Error::NotFound("Assignment not found".to_string()))?;
        let test = self
            .store
            .get_test(assignment.test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;

        if !test.policy.block_tab_switch {
            return Ok(false);
        }
        if tab_switch_total < i64::from(test.auto_flag_threshold) {
            return Ok(false);
        }

        self.store.mark_flagged(attempt.id).await?;
        tracing::warn!(
            attempt_id = %attempt.id,
            tab_switches = tab_switch_total,
            threshold = test.auto_flag_threshold,
            "attempt flagged for review"
        );
        Ok(true)
    }
}
