use crate::model::{Snapshot, Student};
use anyhow::Context;
use serde::Deserialize;

pub const ROSTER_HEADERS: [&str; 8] = [
    "Name",
    "Parent Name",
    "Email",
    "Phone",
    "DOB",
    "Status",
    "Enrolled Classes",
    "Notes",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RosterFilter {
    /// Export archived students instead of active ones.
    pub archived: bool,
    /// Case-insensitive substring of name or email.
    pub search: Option<String>,
}

impl RosterFilter {
    fn matches(&self, s: &Student) -> bool {
        if s.active == self.archived {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let q = q.to_lowercase();
                s.name.to_lowercase().contains(&q) || s.email.to_lowercase().contains(&q)
            }
            None => true,
        }
    }
}

pub fn select<'a>(snapshot: &'a Snapshot, filter: &RosterFilter) -> Vec<&'a Student> {
    let mut rows: Vec<&Student> = snapshot
        .students
        .iter()
        .filter(|s| filter.matches(s))
        .collect();
    rows.sort_by_key(|s| s.name.to_lowercase());
    rows
}

fn enrolled_names(snapshot: &Snapshot, s: &Student) -> String {
    s.enrolled_category_ids
        .iter()
        .map(|id| {
            snapshot
                .category(id)
                .map(|c| c.name.as_str())
                .unwrap_or(id.as_str())
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Renders the roster as CSV with every cell quoted.
pub fn export_csv(snapshot: &Snapshot, filter: &RosterFilter) -> anyhow::Result<(String, usize)> {
    let rows = select(snapshot, filter);
    let mut w = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    w.write_record(ROSTER_HEADERS)?;
    for s in &rows {
        let status = if s.active { "Active" } else { "Archived" };
        let enrolled = enrolled_names(snapshot, s);
        w.write_record([
            s.name.as_str(),
            s.parent_name.as_str(),
            s.email.as_str(),
            s.phone.as_str(),
            s.dob.as_str(),
            status,
            enrolled.as_str(),
            s.notes.as_str(),
        ])?;
    }
    let bytes = w
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to finish roster csv: {}", e.error()))?;
    let text = String::from_utf8(bytes).context("roster csv is not utf-8")?;
    Ok((text, rows.len()))
}
