//! Notification seam.
//!
//! The tracker decides *that* an intervention fires; delivery (email, SMS,
//! push) belongs to whatever process embeds the engine. The notifier is
//! invoked after the intervention row is durably persisted, so a failed
//! delivery can never roll back the record.

use crate::model::Intervention;

pub trait InterventionNotifier: Send + Sync {
    fn intervention_triggered(&self, intervention: &Intervention);
}

/// Default notifier — surfaces triggered interventions on the log only.
pub struct LogNotifier;

impl InterventionNotifier for LogNotifier {
    fn intervention_triggered(&self, intervention: &Intervention) {
        log::info!(
            "intervention {} ({}) triggered for user {} against assessment {}",
            intervention.id,
            intervention.intervention_type.as_str(),
            intervention.user_id,
            intervention.risk_assessment_id,
        );
    }
}
