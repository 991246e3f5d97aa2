use crate::mirror::MirrorOp;
use crate::model::{Collection, Reminder, Snapshot};
use serde::Serialize;

/// What else has to go when a record of a given kind is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeRule {
    /// Attendance, fees and progress reports of the student go; the student is
    /// stripped from reminders and reminders left without recipients go.
    Student,
    /// Attendance and fees recorded against the class go.
    ScheduledClass,
    /// Only the record itself.
    Plain,
    /// Never removed one at a time; only a factory reset drops these.
    Protected,
}

pub fn rule_for(collection: Collection) -> CascadeRule {
    match collection {
        Collection::Students => CascadeRule::Student,
        Collection::Schedule => CascadeRule::ScheduledClass,
        // Categories and locations are weak references; dangling ids are tolerated.
        Collection::Categories
        | Collection::Locations
        | Collection::Attendance
        | Collection::Fees
        | Collection::Reminders
        | Collection::Events
        | Collection::Announcements
        | Collection::ProgressReports => CascadeRule::Plain,
        Collection::UserAccounts => CascadeRule::Protected,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletePlan {
    pub removals: Vec<(Collection, String)>,
    /// Reminders that keep at least one recipient after the student is stripped.
    pub rewritten_reminders: Vec<Reminder>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub removed: usize,
    pub attendance_removed: usize,
    pub fees_removed: usize,
    pub progress_reports_removed: usize,
    pub reminders_removed: usize,
    pub reminders_updated: usize,
}

pub fn plan_delete(snapshot: &Snapshot, collection: Collection, id: &str) -> DeletePlan {
    let mut plan = DeletePlan::default();
    let rule = rule_for(collection);
    if rule == CascadeRule::Protected {
        return plan;
    }
    let Some(stored) = snapshot.stored_key(collection, id) else {
        return plan;
    };
    let id = stored.as_str();
    plan.removals.push((collection, id.to_string()));

    match rule {
        CascadeRule::Student => {
            plan.removals.extend(
                snapshot
                    .attendance
                    .iter()
                    .filter(|a| a.student_id == id)
                    .map(|a| (Collection::Attendance, a.id.clone())),
            );
            plan.removals.extend(
                snapshot
                    .fees
                    .iter()
                    .filter(|f| f.student_id == id)
                    .map(|f| (Collection::Fees, f.id.clone())),
            );
            plan.removals.extend(
                snapshot
                    .progress_reports
                    .iter()
                    .filter(|p| p.student_id == id)
                    .map(|p| (Collection::ProgressReports, p.id.clone())),
            );
            for r in snapshot
                .reminders
                .iter()
                .filter(|r| r.student_ids.iter().any(|sid| sid == id))
            {
                let mut updated = r.clone();
                updated.student_ids.retain(|sid| sid != id);
                if updated.student_ids.is_empty() {
                    plan.removals.push((Collection::Reminders, r.id.clone()));
                } else {
                    plan.rewritten_reminders.push(updated);
                }
            }
        }
        CascadeRule::ScheduledClass => {
            plan.removals.extend(
                snapshot
                    .attendance
                    .iter()
                    .filter(|a| a.class_id == id)
                    .map(|a| (Collection::Attendance, a.id.clone())),
            );
            plan.removals.extend(
                snapshot
                    .fees
                    .iter()
                    .filter(|f| f.class_id == id)
                    .map(|f| (Collection::Fees, f.id.clone())),
            );
        }
        CascadeRule::Plain | CascadeRule::Protected => {}
    }
    plan
}

impl DeletePlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.rewritten_reminders.is_empty()
    }

    pub fn apply(&self, snapshot: &mut Snapshot) -> DeleteSummary {
        let mut summary = DeleteSummary::default();
        for (collection, id) in &self.removals {
            let n = snapshot.remove(*collection, id);
            summary.removed += n;
            match collection {
                Collection::Attendance => summary.attendance_removed += n,
                Collection::Fees => summary.fees_removed += n,
                Collection::ProgressReports => summary.progress_reports_removed += n,
                Collection::Reminders => summary.reminders_removed += n,
                _ => {}
            }
        }
        for updated in &self.rewritten_reminders {
            if let Some(slot) = snapshot.reminders.iter_mut().find(|r| r.id == updated.id) {
                *slot = updated.clone();
                summary.reminders_updated += 1;
            }
        }
        summary
    }

    pub fn mirror_batch(&self) -> Vec<MirrorOp> {
        let mut batch: Vec<MirrorOp> = self
            .removals
            .iter()
            .map(|(c, id)| MirrorOp::delete(*c, id))
            .collect();
        for r in &self.rewritten_reminders {
            match MirrorOp::set(Collection::Reminders, &r.id, r) {
                Ok(op) => batch.push(op),
                Err(e) => tracing::warn!(error = %e, reminder = %r.id, "skipping mirror rewrite"),
            }
        }
        batch
    }
}
