use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    HeadTeacher,
    Teacher,
    #[default]
    Student,
}

impl Role {
    /// Roles that survive a factory reset.
    pub fn is_staff_lead(self) -> bool {
        matches!(self, Role::Admin | Role::HeadTeacher)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    #[default]
    Pending,
    Sent,
}

/// The identity attached to the running session after a successful login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserAccount {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub parent_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub dob: String,
    pub enrolled_category_ids: Vec<String>,
    pub active: bool,
    pub joined_date: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassCategory {
    pub id: String,
    pub name: String,
    pub level: String,
    pub fee_per_hour: f64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// A single dated session of a category. `teacher_name` and `location` are
/// free text, not references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduledClass {
    pub id: String,
    pub category_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub teacher_name: String,
    pub location: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub present: bool,
    pub marked_by: String,
    pub marked_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub amount: f64,
    pub paid_date: String,
    pub marked_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub student_ids: Vec<String>,
    pub message: String,
    /// Empty means "send immediately".
    pub scheduled_date: String,
    pub channels: Vec<Channel>,
    pub status: ReminderStatus,
    pub created_at: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: String,
    pub description: String,
    pub location: String,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_via: Option<Vec<Channel>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub date: String,
    /// `ALL`, `STUDENTS`, `TEACHERS`, or a category id.
    pub target_audience: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_via: Option<Vec<Channel>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillScores {
    pub talam: u8,
    pub bhavam: u8,
    pub angashudhi: u8,
    pub memory: u8,
}

impl SkillScores {
    pub fn clamped(self) -> Self {
        let c = |v: u8| v.clamp(1, 10);
        Self {
            talam: c(self.talam),
            bhavam: c(self.bhavam),
            angashudhi: c(self.angashudhi),
            memory: c(self.memory),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressReport {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub term: String,
    pub skills: SkillScores,
    pub comments: String,
    pub assessed_by: String,
}

/// Where the remote document store lives. An empty `database_path` means
/// mirroring is off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MirrorConfig {
    pub project_id: String,
    pub database_path: String,
}

impl MirrorConfig {
    pub fn is_configured(&self) -> bool {
        !self.database_path.trim().is_empty()
    }
}

/// Result of a business-rule checked operation. Rejections are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Students,
    Categories,
    Locations,
    Schedule,
    Attendance,
    Fees,
    Reminders,
    Events,
    Announcements,
    ProgressReports,
    UserAccounts,
}

impl Collection {
    pub const ALL: [Collection; 11] = [
        Collection::Students,
        Collection::Categories,
        Collection::Locations,
        Collection::Schedule,
        Collection::Attendance,
        Collection::Fees,
        Collection::Reminders,
        Collection::Events,
        Collection::Announcements,
        Collection::ProgressReports,
        Collection::UserAccounts,
    ];

    /// Collections emptied by a factory reset.
    pub const TRANSACTIONAL: [Collection; 8] = [
        Collection::Students,
        Collection::Schedule,
        Collection::Attendance,
        Collection::Fees,
        Collection::Reminders,
        Collection::Events,
        Collection::Announcements,
        Collection::ProgressReports,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Categories => "categories",
            Collection::Locations => "locations",
            Collection::Schedule => "schedule",
            Collection::Attendance => "attendance",
            Collection::Fees => "fees",
            Collection::Reminders => "reminders",
            Collection::Events => "events",
            Collection::Announcements => "announcements",
            Collection::ProgressReports => "progressReports",
            Collection::UserAccounts => "userAccounts",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Whole application state; this is both the persisted document and the
/// backup file shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub current_user: Option<SessionUser>,
    #[serde(default)]
    pub user_accounts: Vec<UserAccount>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub categories: Vec<ClassCategory>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub schedule: Vec<ScheduledClass>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub fees: Vec<PaymentRecord>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub announcements: Vec<Announcement>,
    #[serde(default)]
    pub progress_reports: Vec<ProgressReport>,
    #[serde(default, alias = "firebaseConfig", skip_serializing_if = "Option::is_none")]
    pub mirror_config: Option<MirrorConfig>,
    /// Top-level keys written by newer versions; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record living in one of the snapshot collections.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Natural document id (email for accounts).
    fn key(&self) -> &str;
    fn set_key(&mut self, key: String);
    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self>;

    fn matches_key(&self, key: &str) -> bool {
        self.key() == key
    }
}

macro_rules! id_entity {
    ($ty:ty, $collection:expr, $field:ident) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn key(&self) -> &str {
                &self.id
            }

            fn set_key(&mut self, key: String) {
                self.id = key;
            }

            fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
                &mut snapshot.$field
            }
        }
    };
}

id_entity!(Student, Collection::Students, students);
id_entity!(ClassCategory, Collection::Categories, categories);
id_entity!(Location, Collection::Locations, locations);
id_entity!(ScheduledClass, Collection::Schedule, schedule);
id_entity!(AttendanceRecord, Collection::Attendance, attendance);
id_entity!(PaymentRecord, Collection::Fees, fees);
id_entity!(Reminder, Collection::Reminders, reminders);
id_entity!(Event, Collection::Events, events);
id_entity!(Announcement, Collection::Announcements, announcements);
id_entity!(ProgressReport, Collection::ProgressReports, progress_reports);

impl Entity for UserAccount {
    const COLLECTION: Collection = Collection::UserAccounts;

    fn key(&self) -> &str {
        &self.email
    }

    fn set_key(&mut self, key: String) {
        self.email = key;
    }

    fn items_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.user_accounts
    }

    fn matches_key(&self, key: &str) -> bool {
        same_email(&self.email, key)
    }
}

/// Runs `$body` with `$items` bound to the collection's typed vector.
macro_rules! with_items {
    ($snapshot:expr, $collection:expr, |$items:ident| $body:expr) => {
        match $collection {
            Collection::Students => {
                let $items = &$snapshot.students;
                $body
            }
            Collection::Categories => {
                let $items = &$snapshot.categories;
                $body
            }
            Collection::Locations => {
                let $items = &$snapshot.locations;
                $body
            }
            Collection::Schedule => {
                let $items = &$snapshot.schedule;
                $body
            }
            Collection::Attendance => {
                let $items = &$snapshot.attendance;
                $body
            }
            Collection::Fees => {
                let $items = &$snapshot.fees;
                $body
            }
            Collection::Reminders => {
                let $items = &$snapshot.reminders;
                $body
            }
            Collection::Events => {
                let $items = &$snapshot.events;
                $body
            }
            Collection::Announcements => {
                let $items = &$snapshot.announcements;
                $body
            }
            Collection::ProgressReports => {
                let $items = &$snapshot.progress_reports;
                $body
            }
            Collection::UserAccounts => {
                let $items = &$snapshot.user_accounts;
                $body
            }
        }
    };
}

fn decode_docs<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>, serde_json::Error> {
    docs.into_iter().map(serde_json::from_value).collect()
}

impl Snapshot {
    pub fn len(&self, collection: Collection) -> usize {
        with_items!(self, collection, |items| items.len())
    }

    pub fn keys(&self, collection: Collection) -> Vec<String> {
        with_items!(self, collection, |items| items
            .iter()
            .map(|x| x.key().to_string())
            .collect())
    }

    pub fn contains(&self, collection: Collection, key: &str) -> bool {
        self.stored_key(collection, key).is_some()
    }

    /// The stored natural id of the record matching `key`.
    pub fn stored_key(&self, collection: Collection, key: &str) -> Option<String> {
        with_items!(self, collection, |items| items
            .iter()
            .find(|x| x.matches_key(key))
            .map(|x| x.key().to_string()))
    }

    /// Every record of a collection as `(natural id, document)`.
    pub fn documents(&self, collection: Collection) -> Result<Vec<(String, Value)>, serde_json::Error> {
        with_items!(self, collection, |items| items
            .iter()
            .map(|x| serde_json::to_value(x).map(|doc| (x.key().to_string(), doc)))
            .collect())
    }

    /// Removes the records matching `key`; returns how many were dropped.
    pub fn remove(&mut self, collection: Collection, key: &str) -> usize {
        fn drop_matching<T: Entity>(items: &mut Vec<T>, key: &str) -> usize {
            let before = items.len();
            items.retain(|x| !x.matches_key(key));
            before - items.len()
        }
        match collection {
            Collection::Students => drop_matching(&mut self.students, key),
            Collection::Categories => drop_matching(&mut self.categories, key),
            Collection::Locations => drop_matching(&mut self.locations, key),
            Collection::Schedule => drop_matching(&mut self.schedule, key),
            Collection::Attendance => drop_matching(&mut self.attendance, key),
            Collection::Fees => drop_matching(&mut self.fees, key),
            Collection::Reminders => drop_matching(&mut self.reminders, key),
            Collection::Events => drop_matching(&mut self.events, key),
            Collection::Announcements => drop_matching(&mut self.announcements, key),
            Collection::ProgressReports => drop_matching(&mut self.progress_reports, key),
            Collection::UserAccounts => drop_matching(&mut self.user_accounts, key),
        }
    }

    /// Decodes `docs` and swaps them in as the whole collection. On a decode
    /// error the collection is left as it was.
    pub fn replace_from_documents(
        &mut self,
        collection: Collection,
        docs: Vec<Value>,
    ) -> Result<(), serde_json::Error> {
        match collection {
            Collection::Students => self.students = decode_docs(docs)?,
            Collection::Categories => self.categories = decode_docs(docs)?,
            Collection::Locations => self.locations = decode_docs(docs)?,
            Collection::Schedule => self.schedule = decode_docs(docs)?,
            Collection::Attendance => self.attendance = decode_docs(docs)?,
            Collection::Fees => self.fees = decode_docs(docs)?,
            Collection::Reminders => self.reminders = decode_docs(docs)?,
            Collection::Events => self.events = decode_docs(docs)?,
            Collection::Announcements => self.announcements = decode_docs(docs)?,
            Collection::ProgressReports => self.progress_reports = decode_docs(docs)?,
            Collection::UserAccounts => self.user_accounts = decode_docs(docs)?,
        }
        Ok(())
    }

    pub fn clear(&mut self, collection: Collection) {
        match collection {
            Collection::Students => self.students.clear(),
            Collection::Categories => self.categories.clear(),
            Collection::Locations => self.locations.clear(),
            Collection::Schedule => self.schedule.clear(),
            Collection::Attendance => self.attendance.clear(),
            Collection::Fees => self.fees.clear(),
            Collection::Reminders => self.reminders.clear(),
            Collection::Events => self.events.clear(),
            Collection::Announcements => self.announcements.clear(),
            Collection::ProgressReports => self.progress_reports.clear(),
            Collection::UserAccounts => self.user_accounts.clear(),
        }
    }

    pub fn account(&self, email: &str) -> Option<&UserAccount> {
        self.user_accounts
            .iter()
            .find(|a| same_email(&a.email, email))
    }

    /// Student profiles sharing a contact email (siblings).
    pub fn students_with_email<'a>(&'a self, email: &'a str) -> impl Iterator<Item = &'a Student> + 'a {
        self.students
            .iter()
            .filter(move |s| same_email(&s.email, email))
    }

    pub fn category(&self, id: &str) -> Option<&ClassCategory> {
        self.categories.iter().find(|c| c.id == id)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn same_email(a: &str, b: &str) -> bool {
    normalize_email(a) == normalize_email(b)
}

pub fn attendance_id(class_id: &str, student_id: &str) -> String {
    format!("{}_{}", class_id, student_id)
}

pub fn payment_id(class_id: &str, student_id: &str) -> String {
    format!("pay_{}_{}", class_id, student_id)
}
