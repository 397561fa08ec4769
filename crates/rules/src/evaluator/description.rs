use nudge_core::{ReminderPayload, TaskSnapshot};

/// Fires whenever the description is absent, regardless of status.
pub(super) fn missing_description(task: &TaskSnapshot) -> Option<ReminderPayload> {
    (!task.has_description).then_some(ReminderPayload::MissingDescription)
}
