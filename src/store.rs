use crate::cascade::{self, DeleteSummary};
use crate::config::StoreConfig;
use crate::db;
use crate::error::StoreError;
use crate::mirror::{Mirror, MirrorOp, RemoteSnapshot};
use crate::model::{
    attendance_id, normalize_email, payment_id, same_email, AttendanceRecord, Collection, Entity,
    MirrorConfig, Outcome, PaymentRecord, ProgressReport, Reminder, Role, SessionUser, Snapshot,
    Student, UserAccount,
};
use crate::seed;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

const SYSTEM_ACTOR: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentEdit {
    Updated,
    NotFound,
    /// The new email is another household's login.
    EmailTaken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub students: usize,
    pub classes: usize,
    pub pushed_documents: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSummary {
    pub records_removed: usize,
    pub accounts_kept: usize,
    pub accounts_removed: usize,
}

/// Parses a saved snapshot and fills every top-level key it lacks (or holds
/// as `null`) from `defaults`. Unknown keys are kept.
pub fn load_snapshot(text: &str, defaults: &Snapshot) -> Result<Snapshot, StoreError> {
    let Value::Object(mut obj) = serde_json::from_str::<Value>(text)? else {
        return Err(StoreError::NotAnObject);
    };
    let Value::Object(defaults) = serde_json::to_value(defaults)? else {
        return Err(StoreError::NotAnObject);
    };
    for (k, v) in defaults {
        if obj.get(&k).map_or(true, Value::is_null) {
            obj.insert(k, v);
        }
    }
    Ok(serde_json::from_value(Value::Object(obj))?)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The application state container. All mutation goes through these methods;
/// each one persists the full snapshot before returning and forwards the
/// change to the mirror when one is connected.
pub struct Store {
    state: Snapshot,
    local: Connection,
    config: StoreConfig,
    mirror: Option<Mirror>,
}

impl Store {
    pub fn open(local: Connection, config: StoreConfig) -> Self {
        let defaults = seed::default_snapshot(&config);
        let saved = match db::kv_get(&local, &config.storage_key) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "failed to read saved snapshot");
                None
            }
        };
        let (state, seeded) = match saved {
            None => {
                tracing::info!("no saved snapshot; seeding demo data");
                (defaults, true)
            }
            Some(text) => match load_snapshot(&text, &defaults) {
                Ok(s) => (s, false),
                Err(e) => {
                    // Keep the broken document on disk until a mutation replaces it.
                    tracing::error!(error = %e, "saved snapshot is unreadable; using demo data");
                    (defaults, false)
                }
            },
        };

        let mut store = Self {
            state,
            local,
            config,
            mirror: None,
        };
        if seeded {
            store.commit();
        }
        store.connect_mirror();
        store
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.state
    }

    #[cfg(test)]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&SessionUser> {
        self.state.current_user.as_ref()
    }

    fn actor(&self) -> String {
        self.state
            .current_user
            .as_ref()
            .map(|u| u.email.clone())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string())
    }

    fn commit(&self) {
        let text = match serde_json::to_string(&self.state) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize snapshot");
                return;
            }
        };
        if let Err(e) = db::kv_put(&self.local, &self.config.storage_key, &text) {
            tracing::error!(error = %e, "failed to persist snapshot");
        }
    }

    // ---- remote mirror ----

    pub fn mirror_connected(&self) -> bool {
        self.mirror.is_some()
    }

    fn submit(&self, batch: Vec<MirrorOp>) {
        if let Some(m) = &self.mirror {
            m.submit(batch);
        }
    }

    fn submit_set<T: Entity>(&self, item: &T) {
        if self.mirror.is_none() {
            return;
        }
        match MirrorOp::set(T::COLLECTION, item.key(), item) {
            Ok(op) => self.submit(vec![op]),
            Err(e) => tracing::error!(error = %e, collection = T::COLLECTION.key(), "mirror write skipped"),
        }
    }

    /// Opens the configured mirror without reading from it.
    fn open_mirror(&mut self) -> bool {
        self.mirror = None;
        let Some(cfg) = self
            .state
            .mirror_config
            .clone()
            .filter(MirrorConfig::is_configured)
        else {
            return false;
        };
        match Mirror::connect(&cfg) {
            Ok(m) => {
                tracing::info!(project = %cfg.project_id, "mirror connected");
                self.mirror = Some(m);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "mirror connection failed; running local only");
                false
            }
        }
    }

    fn connect_mirror(&mut self) -> bool {
        let connected = self.open_mirror();
        if connected {
            self.pull_remote();
        }
        connected
    }

    pub fn configure_mirror(&mut self, config: MirrorConfig) -> bool {
        self.state.mirror_config = Some(config);
        self.commit();
        self.connect_mirror()
    }

    /// Reads every collection from the mirror and applies each as a change
    /// notification. Returns how many collections were replaced.
    pub fn pull_remote(&mut self) -> usize {
        let Some(mirror) = self.mirror.as_ref() else {
            return 0;
        };
        let mut notes = Vec::new();
        for collection in Collection::ALL {
            match mirror.fetch(collection) {
                Ok(docs) => notes.push(RemoteSnapshot {
                    collection,
                    size: docs.len(),
                    docs,
                }),
                Err(e) => tracing::error!(error = %e, %collection, "mirror read failed"),
            }
        }
        notes
            .into_iter()
            .map(|n| self.apply_remote_snapshot(n))
            .filter(|applied| *applied)
            .count()
    }

    /// Whole-collection overwrite, last writer wins. A notification that is
    /// empty both in size and payload is ignored so a transient empty read
    /// cannot wipe local data.
    pub fn apply_remote_snapshot(&mut self, note: RemoteSnapshot) -> bool {
        if note.size == 0 && note.docs.is_empty() {
            tracing::debug!(collection = %note.collection, "ignoring empty remote snapshot");
            return false;
        }
        let collection = note.collection;
        let count = note.docs.len();
        match self.state.replace_from_documents(collection, note.docs) {
            Ok(()) => {
                self.commit();
                tracing::debug!(%collection, count, "collection replaced from mirror");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, %collection, "undecodable remote snapshot ignored");
                false
            }
        }
    }

    pub fn flush_mirror(&self) {
        if let Some(m) = &self.mirror {
            m.flush();
        }
    }

    #[cfg(test)]
    fn attach_mirror(&mut self, mirror: Mirror) {
        self.mirror = Some(mirror);
    }

    // ---- authentication ----

    pub fn login(&mut self, email: &str, password: &str) -> Option<SessionUser> {
        let email = normalize_email(email);
        let Some(account) = self
            .state
            .user_accounts
            .iter()
            .find(|a| same_email(&a.email, &email) && a.password == password)
        else {
            tracing::info!(%email, "login rejected");
            return None;
        };
        let mut user = SessionUser {
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            student_ids: None,
        };
        if account.role == Role::Student {
            user.student_ids = Some(
                self.state
                    .students_with_email(&email)
                    .map(|s| s.id.clone())
                    .collect(),
            );
        }
        self.state.current_user = Some(user.clone());
        self.commit();
        tracing::info!(email = %user.email, role = ?user.role, "login");
        Some(user)
    }

    /// Self-service sign up. Only reserved staff emails and emails already on
    /// a student record (verified by date of birth) may register; the role is
    /// decided here, not by the caller.
    pub fn register(&mut self, account: UserAccount, dob: Option<&str>) -> Outcome {
        let email = normalize_email(&account.email);
        if email.is_empty() {
            return Outcome::rejected("Email is required.");
        }
        if self.state.account(&email).is_some() {
            return Outcome::rejected("Account with this email already exists.");
        }
        if account.password.chars().count() < self.config.min_password_len {
            return Outcome::rejected(format!(
                "Password must be at least {} characters.",
                self.config.min_password_len
            ));
        }

        let is_admin = email == normalize_email(&self.config.admin_email);
        let is_head_teacher = email == normalize_email(&self.config.head_teacher_email);
        if !is_admin && !is_head_teacher {
            let dobs: Vec<&str> = self
                .state
                .students_with_email(&email)
                .map(|s| s.dob.as_str())
                .collect();
            if dobs.is_empty() {
                return Outcome::rejected(
                    "Access Denied: This email is not recognized in our student database. Please contact the Admin.",
                );
            }
            let Some(dob) = dob.map(str::trim).filter(|d| !d.is_empty()) else {
                return Outcome::rejected("Verification Failed: Date of Birth is required.");
            };
            if !dobs.contains(&dob) {
                return Outcome::rejected(
                    "Verification Failed: Date of Birth does not match our records for this email.",
                );
            }
        }

        let role = if is_admin {
            Role::Admin
        } else if is_head_teacher {
            Role::HeadTeacher
        } else {
            Role::Student
        };
        self.insert_account(UserAccount {
            email,
            role,
            ..account
        });
        Outcome::ok("Registration Successful!")
    }

    /// Administrative account creation; no identity verification.
    pub fn add_user(&mut self, account: UserAccount) -> Outcome {
        let email = normalize_email(&account.email);
        if email.is_empty() {
            return Outcome::rejected("Email is required.");
        }
        if self.state.account(&email).is_some() {
            return Outcome::rejected("Account already exists.");
        }
        self.insert_account(UserAccount { email, ..account });
        Outcome::ok("User added successfully.")
    }

    fn insert_account(&mut self, account: UserAccount) {
        tracing::info!(email = %account.email, role = ?account.role, "account created");
        self.state.user_accounts.push(account.clone());
        self.commit();
        self.submit_set(&account);
    }

    pub fn reset_password(&mut self, email: &str, new_password: Option<&str>) -> bool {
        let password = new_password
            .filter(|p| !p.is_empty())
            .unwrap_or(self.config.default_password.as_str())
            .to_string();
        let Some(account) = self
            .state
            .user_accounts
            .iter_mut()
            .find(|a| same_email(&a.email, email))
        else {
            return false;
        };
        account.password = password;
        let account = account.clone();
        self.commit();
        self.submit_set(&account);
        true
    }

    /// Renames the login email and every student profile that shares it.
    pub fn update_email(&mut self, old_email: &str, new_email: &str) -> Outcome {
        let old = normalize_email(old_email);
        let new = normalize_email(new_email);
        if new.is_empty() {
            return Outcome::rejected("New email is required.");
        }
        if old == new {
            return Outcome::ok("Email unchanged.");
        }
        if self.state.account(&new).is_some() {
            return Outcome::rejected("Account with this email already exists.");
        }
        if self.state.account(&old).is_none() && self.state.students_with_email(&old).next().is_none()
        {
            return Outcome::rejected("No account or student uses this email.");
        }
        let batch = self.rename_email(&old, &new, None);
        self.commit();
        self.submit(batch);
        Outcome::ok("Email updated.")
    }

    /// Moves the account, sibling students and the session from `old` to
    /// `new`. Callers make sure no other account owns `new`.
    fn rename_email(&mut self, old: &str, new: &str, skip_student: Option<&str>) -> Vec<MirrorOp> {
        let mut batch = Vec::new();
        if let Some(account) = self
            .state
            .user_accounts
            .iter_mut()
            .find(|a| same_email(&a.email, old))
        {
            let old_key = account.email.clone();
            account.email = new.to_string();
            batch.push(MirrorOp::delete(Collection::UserAccounts, &old_key));
            if let Ok(op) = MirrorOp::set(Collection::UserAccounts, new, &*account) {
                batch.push(op);
            }
        }
        for s in self
            .state
            .students
            .iter_mut()
            .filter(|s| Some(s.id.as_str()) != skip_student && same_email(&s.email, old))
        {
            s.email = new.to_string();
            if let Ok(op) = MirrorOp::set(Collection::Students, &s.id, &*s) {
                batch.push(op);
            }
        }
        if let Some(user) = self
            .state
            .current_user
            .as_mut()
            .filter(|u| same_email(&u.email, old))
        {
            user.email = new.to_string();
        }
        tracing::info!(%old, %new, ops = batch.len(), "email renamed");
        batch
    }

    pub fn logout(&mut self) {
        self.state.current_user = None;
        self.commit();
    }

    // ---- generic CRUD ----

    /// Inserts `item`, generating an id when it has none. An existing record
    /// with the same id is replaced rather than duplicated.
    pub fn add<T: Entity>(&mut self, mut item: T) -> T {
        if item.key().trim().is_empty() {
            item.set_key(new_id());
        }
        let items = T::items_mut(&mut self.state);
        match items.iter_mut().find(|x| x.matches_key(item.key())) {
            Some(slot) => {
                tracing::warn!(collection = T::COLLECTION.key(), id = item.key(), "add replaced existing record");
                *slot = item.clone();
            }
            None => items.push(item.clone()),
        }
        self.commit();
        self.submit_set(&item);
        item
    }

    /// Full-record replace by id; `false` when nothing matched.
    pub fn update<T: Entity>(&mut self, item: T) -> bool {
        let Some(slot) = T::items_mut(&mut self.state)
            .iter_mut()
            .find(|x| x.matches_key(item.key()))
        else {
            return false;
        };
        *slot = item.clone();
        self.commit();
        self.submit_set(&item);
        true
    }

    /// Student edits propagate an email change to siblings and the account.
    /// An email that already belongs to another login is refused outright.
    pub fn update_student(&mut self, student: Student) -> StudentEdit {
        let Some(pos) = self.state.students.iter().position(|s| s.id == student.id) else {
            return StudentEdit::NotFound;
        };
        let old = normalize_email(&self.state.students[pos].email);
        let new = normalize_email(&student.email);
        let email_changed = old != new && !old.is_empty() && !new.is_empty();
        if email_changed && self.state.account(&new).is_some() {
            tracing::warn!(student = %student.id, %new, "student email belongs to another account");
            return StudentEdit::EmailTaken;
        }
        self.state.students[pos] = student.clone();
        let mut batch = Vec::new();
        if let Ok(op) = MirrorOp::set(Collection::Students, &student.id, &student) {
            batch.push(op);
        }
        if email_changed {
            batch.extend(self.rename_email(&old, &new, Some(&student.id)));
        }
        self.commit();
        self.submit(batch);
        StudentEdit::Updated
    }

    pub fn add_progress_report(&mut self, mut report: ProgressReport) -> ProgressReport {
        report.skills = report.skills.clamped();
        if report.assessed_by.is_empty() {
            report.assessed_by = self.actor();
        }
        self.add(report)
    }

    pub fn add_reminder(&mut self, mut reminder: Reminder) -> Reminder {
        if reminder.created_at.is_empty() {
            reminder.created_at = now_rfc3339();
        }
        if reminder.created_by.is_empty() {
            reminder.created_by = self.actor();
        }
        self.add(reminder)
    }

    /// Deletes a record and whatever its cascade rule drags along.
    pub fn delete_item(&mut self, collection: Collection, id: &str) -> DeleteSummary {
        let plan = cascade::plan_delete(&self.state, collection, id);
        if plan.is_empty() {
            return DeleteSummary::default();
        }
        let summary = plan.apply(&mut self.state);
        self.commit();
        if self.mirror.is_some() {
            self.submit(plan.mirror_batch());
        }
        tracing::info!(%collection, id, removed = summary.removed, "deleted");
        summary
    }

    // ---- attendance & fees ----

    fn normalize_attendance(&self, mut record: AttendanceRecord) -> AttendanceRecord {
        record.id = attendance_id(&record.class_id, &record.student_id);
        if record.marked_by.is_empty() {
            record.marked_by = self.actor();
        }
        if record.marked_at.is_empty() {
            record.marked_at = now_rfc3339();
        }
        record
    }

    /// Upsert keyed by `classId_studentId`.
    pub fn mark_attendance(&mut self, record: AttendanceRecord) -> AttendanceRecord {
        let record = self.normalize_attendance(record);
        match self.state.attendance.iter_mut().find(|a| a.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => self.state.attendance.push(record.clone()),
        }
        self.commit();
        self.submit_set(&record);
        record
    }

    /// One removal pass over colliding ids, one insertion pass. Duplicate
    /// pairs within `records` collapse to the last one.
    pub fn mark_bulk_attendance(&mut self, records: Vec<AttendanceRecord>) -> usize {
        let mut seen = HashSet::new();
        let mut incoming: Vec<AttendanceRecord> = records
            .into_iter()
            .rev()
            .map(|r| self.normalize_attendance(r))
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        incoming.reverse();

        self.state.attendance.retain(|a| !seen.contains(&a.id));
        self.state.attendance.extend(incoming.iter().cloned());
        self.commit();

        if self.mirror.is_some() {
            let batch = incoming
                .iter()
                .filter_map(|r| MirrorOp::set(Collection::Attendance, &r.id, r).ok())
                .collect();
            self.submit(batch);
        }
        incoming.len()
    }

    /// Paid ↔ unpaid for one (class, student) pair. Returns the new record
    /// when toggled on, `None` when toggled off.
    pub fn toggle_payment(&mut self, class_id: &str, student_id: &str, amount: f64) -> Option<PaymentRecord> {
        let existing: Vec<String> = self
            .state
            .fees
            .iter()
            .filter(|f| f.class_id == class_id && f.student_id == student_id)
            .map(|f| f.id.clone())
            .collect();

        if !existing.is_empty() {
            self.state
                .fees
                .retain(|f| !(f.class_id == class_id && f.student_id == student_id));
            self.commit();
            self.submit(
                existing
                    .iter()
                    .map(|id| MirrorOp::delete(Collection::Fees, id))
                    .collect(),
            );
            tracing::info!(class_id, student_id, "payment cleared");
            return None;
        }

        let record = PaymentRecord {
            id: payment_id(class_id, student_id),
            class_id: class_id.to_string(),
            student_id: student_id.to_string(),
            amount,
            paid_date: now_rfc3339(),
            marked_by: self.actor(),
        };
        self.state.fees.push(record.clone());
        self.commit();
        self.submit_set(&record);
        tracing::info!(class_id, student_id, amount, "payment recorded");
        Some(record)
    }

    /// Changes the amount only; the record stays paid.
    pub fn update_payment(&mut self, payment_id: &str, amount: f64) -> bool {
        let Some(payment) = self.state.fees.iter_mut().find(|f| f.id == payment_id) else {
            return false;
        };
        payment.amount = amount;
        let payment = payment.clone();
        self.commit();
        self.submit_set(&payment);
        true
    }

    // ---- bulk system operations ----

    pub fn download_backup(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.state)?)
    }

    /// Replaces every collection with the backup's. The running session is
    /// kept, and so is the mirror config when the backup carries none.
    pub fn restore_backup(&mut self, text: &str, push_to_mirror: bool) -> Result<RestoreSummary, StoreError> {
        let value: Value = serde_json::from_str(text)?;
        let Some(obj) = value.as_object() else {
            return Err(StoreError::NotAnObject);
        };
        for key in [Collection::Students.key(), Collection::Schedule.key()] {
            if !obj.get(key).is_some_and(Value::is_array) {
                return Err(StoreError::InvalidBackup(format!("missing `{key}` array")));
            }
        }
        let mut restored: Snapshot = serde_json::from_value(value)?;
        let previous_mirror = self.state.mirror_config.clone();
        restored.current_user = self.state.current_user.take();
        if restored.mirror_config.is_none() {
            restored.mirror_config = self.state.mirror_config.take();
        }
        self.state = restored;
        self.commit();
        // Reconnect without pulling so the restored data is not overwritten.
        if self.state.mirror_config != previous_mirror {
            self.open_mirror();
        }

        let pushed_documents = if push_to_mirror { self.push_all() } else { 0 };
        tracing::info!(
            students = self.state.students.len(),
            classes = self.state.schedule.len(),
            pushed_documents,
            "backup restored"
        );
        Ok(RestoreSummary {
            students: self.state.students.len(),
            classes: self.state.schedule.len(),
            pushed_documents,
        })
    }

    fn push_all(&self) -> usize {
        if self.mirror.is_none() {
            return 0;
        }
        let mut batch = Vec::new();
        for collection in Collection::ALL {
            match self.state.documents(collection) {
                Ok(docs) => batch.extend(docs.into_iter().map(|(id, doc)| MirrorOp::Set {
                    collection,
                    id,
                    doc,
                })),
                Err(e) => tracing::error!(error = %e, %collection, "push skipped collection"),
            }
        }
        let n = batch.len();
        self.submit(batch);
        n
    }

    /// Factory reset of transactional data. Categories, locations, the
    /// session and the mirror config stay; so do admin, head-teacher and the
    /// session's own account.
    pub fn clear_all_data(&mut self) -> ClearSummary {
        let mut batch = Vec::new();
        let mut records_removed = 0;
        for collection in Collection::TRANSACTIONAL {
            batch.extend(
                self.state
                    .keys(collection)
                    .iter()
                    .map(|id| MirrorOp::delete(collection, id)),
            );
            records_removed += self.state.len(collection);
            self.state.clear(collection);
        }

        let session_email = self.state.current_user.as_ref().map(|u| u.email.clone());
        let (kept, dropped): (Vec<UserAccount>, Vec<UserAccount>) =
            std::mem::take(&mut self.state.user_accounts)
                .into_iter()
                .partition(|a| {
                    a.role.is_staff_lead()
                        || session_email
                            .as_deref()
                            .is_some_and(|e| same_email(&a.email, e))
                });
        batch.extend(
            dropped
                .iter()
                .map(|a| MirrorOp::delete(Collection::UserAccounts, &a.email)),
        );
        self.state.user_accounts = kept;
        self.commit();
        self.submit(batch);

        let summary = ClearSummary {
            records_removed,
            accounts_kept: self.state.user_accounts.len(),
            accounts_removed: dropped.len(),
        };
        tracing::warn!(
            records = summary.records_removed,
            accounts_removed = summary.accounts_removed,
            "all data cleared"
        );
        summary
    }
}
