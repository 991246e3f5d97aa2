use crate::model::{ClassCategory, ScheduledClass, Snapshot, Student};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

/// Cents rounding used for every displayed fee.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Hours between start and end. Unreadable times count as zero.
pub fn duration_hours(class: &ScheduledClass) -> f64 {
    match (parse_time(&class.start_time), parse_time(&class.end_time)) {
        (Some(start), Some(end)) => (end - start).num_minutes() as f64 / 60.0,
        _ => 0.0,
    }
}

pub fn class_fee(class: &ScheduledClass, category: Option<&ClassCategory>) -> f64 {
    match category {
        Some(cat) => round2(duration_hours(class) * cat.fee_per_hour),
        None => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDue {
    pub student_id: String,
    pub student_name: String,
    pub total_due: f64,
    pub pending_count: usize,
}

fn class_date(class: &ScheduledClass) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(class.date.trim(), "%Y-%m-%d").ok()
}

/// Unpaid fees for classes on or before `today` that concern the student:
/// enrolled in the category, marked present, or already paid once (so a
/// dropped category still shows history).
pub fn student_due(snapshot: &Snapshot, student: &Student, today: NaiveDate) -> StudentDue {
    let mut total = 0.0;
    let mut pending_count = 0;

    for class in &snapshot.schedule {
        if !class_date(class).is_some_and(|d| d <= today) {
            continue;
        }
        let enrolled = student.enrolled_category_ids.contains(&class.category_id);
        let attended = snapshot
            .attendance
            .iter()
            .any(|a| a.class_id == class.id && a.student_id == student.id && a.present);
        let paid = snapshot
            .fees
            .iter()
            .any(|f| f.class_id == class.id && f.student_id == student.id);
        if paid || !(enrolled || attended) {
            continue;
        }
        if let Some(cat) = snapshot.category(&class.category_id) {
            total += class_fee(class, Some(cat));
            pending_count += 1;
        }
    }

    StudentDue {
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        total_due: round2(total),
        pending_count,
    }
}

/// Active students owing anything, largest balance first.
pub fn outstanding(snapshot: &Snapshot, today: NaiveDate) -> Vec<StudentDue> {
    let mut dues: Vec<StudentDue> = snapshot
        .students
        .iter()
        .filter(|s| s.active)
        .map(|s| student_due(snapshot, s, today))
        .filter(|d| d.total_due > 0.0)
        .collect();
    dues.sort_by(|a, b| {
        b.total_due
            .total_cmp(&a.total_due)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    dues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceRecord, PaymentRecord};

    fn class(id: &str, cat: &str, date: &str, start: &str, end: &str) -> ScheduledClass {
        ScheduledClass {
            id: id.into(),
            category_id: cat.into(),
            date: date.into(),
            start_time: start.into(),
            end_time: end.into(),
            ..Default::default()
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn fixture() -> Snapshot {
        let mut s = Snapshot::default();
        s.categories.push(ClassCategory {
            id: "beg".into(),
            name: "Beginner".into(),
            fee_per_hour: 15.0,
            ..Default::default()
        });
        s.categories.push(ClassCategory {
            id: "adv".into(),
            name: "Advanced".into(),
            fee_per_hour: 25.0,
            ..Default::default()
        });
        s.students.push(Student {
            id: "s1".into(),
            name: "Meera".into(),
            enrolled_category_ids: vec!["beg".into()],
            active: true,
            ..Default::default()
        });
        s.schedule.push(class("c1", "beg", "2026-03-01", "17:00", "18:00"));
        s.schedule.push(class("c2", "beg", "2026-03-08", "18:00", "19:30"));
        s.schedule.push(class("c3", "beg", "2026-03-20", "17:00", "18:00"));
        s.schedule.push(class("c4", "adv", "2026-03-05", "17:00", "19:00"));
        s
    }

    #[test]
    fn class_fee_rounds_to_cents() {
        let cat = ClassCategory {
            fee_per_hour: 10.0,
            ..Default::default()
        };
        let c = class("c", "x", "2026-01-01", "17:00", "17:20");
        assert_eq!(class_fee(&c, Some(&cat)), 3.33);
        assert_eq!(class_fee(&c, None), 0.0);
        let broken = class("c", "x", "2026-01-01", "", "17:20");
        assert_eq!(class_fee(&broken, Some(&cat)), 0.0);
    }

    #[test]
    fn due_counts_past_enrolled_unpaid_classes() {
        let mut snap = fixture();
        snap.fees.push(PaymentRecord {
            id: "pay_c1_s1".into(),
            class_id: "c1".into(),
            student_id: "s1".into(),
            amount: 15.0,
            ..Default::default()
        });
        let due = student_due(&snap, &snap.students[0], day("2026-03-10"));
        // c2 only: c1 paid, c3 in the future, c4 not enrolled.
        assert_eq!(due.pending_count, 1);
        assert_eq!(due.total_due, 22.5);
    }

    #[test]
    fn attending_an_unenrolled_class_counts() {
        let mut snap = fixture();
        snap.attendance.push(AttendanceRecord {
            id: "c4_s1".into(),
            class_id: "c4".into(),
            student_id: "s1".into(),
            present: true,
            ..Default::default()
        });
        let due = student_due(&snap, &snap.students[0], day("2026-03-10"));
        assert_eq!(due.pending_count, 3);
        assert_eq!(due.total_due, 15.0 + 22.5 + 50.0);
    }

    #[test]
    fn outstanding_skips_inactive_and_settled() {
        let mut snap = fixture();
        snap.students.push(Student {
            id: "s2".into(),
            name: "Archived".into(),
            enrolled_category_ids: vec!["adv".into()],
            active: false,
            ..Default::default()
        });
        let list = outstanding(&snap, day("2026-03-31"));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].student_id, "s1");
        assert!(outstanding(&snap, day("2026-01-01")).is_empty());
    }
}
