use crate::config::StoreConfig;
use crate::model::{
    Announcement, ClassCategory, Event, Location, PaymentRecord, Role, ScheduledClass, Snapshot,
    Student, UserAccount,
};
use chrono::{Duration, Local};

fn relative_date(days: i64) -> String {
    (Local::now().date_naive() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

fn category(id: &str, name: &str, level: &str, fee_per_hour: f64, description: &str) -> ClassCategory {
    ClassCategory {
        id: id.into(),
        name: name.into(),
        level: level.into(),
        fee_per_hour,
        description: description.into(),
    }
}

fn location(id: &str, name: &str, address: &str) -> Location {
    Location {
        id: id.into(),
        name: name.into(),
        address: address.into(),
    }
}

#[allow(clippy::too_many_arguments)]
fn student(
    id: &str,
    name: &str,
    parent_name: &str,
    email: &str,
    phone: &str,
    address: &str,
    dob: &str,
    categories: &[&str],
    joined_date: &str,
    notes: &str,
) -> Student {
    Student {
        id: id.into(),
        name: name.into(),
        parent_name: parent_name.into(),
        email: email.into(),
        phone: phone.into(),
        address: address.into(),
        dob: dob.into(),
        enrolled_category_ids: categories.iter().map(|c| c.to_string()).collect(),
        active: true,
        joined_date: joined_date.into(),
        notes: notes.into(),
    }
}

fn account(email: &str, password: &str, name: &str, role: Role) -> UserAccount {
    UserAccount {
        email: email.into(),
        password: password.into(),
        name: name.into(),
        role,
    }
}

fn class(id: &str, category_id: &str, days: i64, start: &str, end: &str, location: &str, completed: bool) -> ScheduledClass {
    ScheduledClass {
        id: id.into(),
        category_id: category_id.into(),
        date: relative_date(days),
        start_time: start.into(),
        end_time: end.into(),
        teacher_name: HEAD_TEACHER_NAME.into(),
        location: location.into(),
        completed,
    }
}

const HEAD_TEACHER_NAME: &str = "Sowbhakya Rajabojan";

/// Demo dataset used when no snapshot has been saved yet. Dates are relative
/// to today so the fee screens always have past and upcoming sessions.
pub fn default_snapshot(config: &StoreConfig) -> Snapshot {
    Snapshot {
        current_user: None,
        user_accounts: vec![
            account(&config.admin_email, "admin", "Vinovator", Role::Admin),
            account(
                &config.head_teacher_email,
                "admin",
                HEAD_TEACHER_NAME,
                Role::HeadTeacher,
            ),
            account("ananya@example.com", "password123", "Ananya Krishna", Role::Student),
            account("priya@example.com", "password123", "Priya Sharma", Role::Student),
            account("rahul@example.com", "password123", "Rahul Verma", Role::Student),
        ],
        students: vec![
            student(
                "stu_1",
                "Ananya Krishna",
                "Krishna Kumar",
                "ananya@example.com",
                "07700900123",
                "123 Dance Lane, London",
                "2015-05-20",
                &["cat_1"],
                "2024-01-10",
                "Shows good promise with rhythm.",
            ),
            student(
                "stu_2",
                "Priya Sharma",
                "Rohit Sharma",
                "priya@example.com",
                "07700900456",
                "45 Temple Rd, London",
                "2014-08-15",
                &["cat_2"],
                "2024-02-01",
                "Excellent expression.",
            ),
            student(
                "stu_3",
                "Rahul Verma",
                "Sanjay Verma",
                "rahul@example.com",
                "07700900789",
                "78 High St, London",
                "2013-12-10",
                &["cat_1", "cat_2"],
                "2023-11-20",
                "Hardworking but needs focus on posture.",
            ),
        ],
        categories: vec![
            category(
                "cat_1",
                "Beginner Adavus",
                "Level 1",
                10.0,
                "Fundamental steps and basic rhythm training.",
            ),
            category(
                "cat_2",
                "Intermediate Alarippu",
                "Level 2",
                15.0,
                "Introduction to items and abhinaya.",
            ),
            category(
                "cat_3",
                "Senior Varnam",
                "Level 3",
                20.0,
                "Advanced intricate footwork and expressions.",
            ),
        ],
        locations: vec![
            location("loc_1", "Main Hall", "123 Dance Lane, London"),
            location("loc_2", "Studio 1", "123 Dance Lane, London"),
            location("loc_online", "Online (Zoom)", "Remote"),
        ],
        schedule: vec![
            class("cls_past_1", "cat_1", -7, "17:00", "18:00", "Main Hall", true),
            class("cls_past_2", "cat_2", -3, "18:00", "19:30", "Studio 1", true),
            class("cls_future_1", "cat_1", 1, "17:00", "18:00", "Main Hall", false),
        ],
        attendance: Vec::new(),
        fees: vec![PaymentRecord {
            id: "pay_1".into(),
            class_id: "cls_past_1".into(),
            student_id: "stu_1".into(),
            amount: 10.0,
            paid_date: relative_date(-6),
            marked_by: "System".into(),
        }],
        reminders: Vec::new(),
        events: vec![Event {
            id: "evt_1".into(),
            title: "Vijayadasami Celebration".into(),
            date: relative_date(10),
            description:
                "Annual Vidyarambam ceremony for new students and performance by seniors.".into(),
            location: "Main Hall".into(),
            is_public: true,
            target_audience: None,
            sent_via: None,
        }],
        announcements: vec![Announcement {
            id: "ann_1".into(),
            title: "Holiday Notice".into(),
            content: "Classes will be suspended for Diwali break from Oct 30th to Nov 4th.".into(),
            date: relative_date(-2),
            target_audience: "ALL".into(),
            author: HEAD_TEACHER_NAME.into(),
            sent_via: None,
        }],
        progress_reports: Vec::new(),
        mirror_config: None,
        extra: Default::default(),
    }
}
