//! Synthetic clinical notes sourced from a CSV table.
//!
//! Rows are grouped by condition in first-seen order and every group becomes one synthetic
//! patient whose visits are uploaded in date order.

use crate::{
    elastic::{BulkAction, BulkWriter, IndexSpec},
    ingest::uploader::BulkUploader,
    metrics::IngestTally,
    reports::patient::{PersonSource, generate_nhi},
    retry::RetryPolicy,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

const NOTE_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Errors raised while reading or uploading clinical notes.
#[derive(Debug, Error)]
pub enum NotesError {
    /// The CSV file could not be read or parsed.
    #[error("Error reading CSV file: {0}")]
    Csv(#[from] csv::Error),
    /// A visit date is not `YYYY-MM-DD`.
    #[error("Invalid visit date '{value}' on line {line}: {source}")]
    InvalidDate {
        /// 1-based line number in the file, header included.
        line: usize,
        /// Offending value.
        value: String,
        /// Parser error.
        #[source]
        source: time::error::Parse,
    },
    /// A visit date could not be formatted back.
    #[error("Failed to format visit date: {0}")]
    Format(#[from] time::error::Format),
    /// The age column is not an integer.
    #[error("Invalid age '{value}' for condition '{condition}'")]
    InvalidAge {
        /// Condition group with the bad value.
        condition: String,
        /// Offending value.
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct NoteRow {
    #[serde(rename = "Condition")]
    condition: String,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Age")]
    age: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Note")]
    note: String,
}

/// One dated clinical note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    /// Visit date.
    pub date: Date,
    /// Free-text note.
    pub note: String,
}

/// All visits recorded for one condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionGroup {
    /// Condition name.
    pub condition: String,
    /// Gender taken from the first row of the group.
    pub gender: String,
    /// Age taken from the first row of the group, unparsed.
    pub age: String,
    /// Visits sorted by ascending date.
    pub visits: Vec<Visit>,
}

/// Read condition groups from a CSV file with header `Condition,Gender,Age,Date,Note`.
pub fn load_condition_groups(path: &Path) -> Result<Vec<ConditionGroup>, NotesError> {
    tracing::debug!(path = %path.display(), "Reading CSV file");
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    read_condition_groups(file)
}

/// Read condition groups from CSV text.
pub fn read_condition_groups<R: Read>(input: R) -> Result<Vec<ConditionGroup>, NotesError> {
    let mut reader = csv::Reader::from_reader(input);
    let mut groups: Vec<ConditionGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (row_index, row) in reader.deserialize::<NoteRow>().enumerate() {
        let row = row?;
        let date = Date::parse(row.date.trim(), NOTE_DATE_FORMAT).map_err(|source| {
            NotesError::InvalidDate {
                line: row_index + 2,
                value: row.date.clone(),
                source,
            }
        })?;
        let visit = Visit {
            date,
            note: row.note,
        };
        match positions.get(&row.condition) {
            Some(&position) => groups[position].visits.push(visit),
            None => {
                positions.insert(row.condition.clone(), groups.len());
                groups.push(ConditionGroup {
                    condition: row.condition,
                    gender: row.gender,
                    age: row.age,
                    visits: vec![visit],
                });
            }
        }
    }

    for group in &mut groups {
        group.visits.sort_by_key(|visit| visit.date);
    }
    tracing::debug!(conditions = groups.len(), "Read {} conditions from CSV", groups.len());
    Ok(groups)
}

/// Tracks the `condition_note` keys already issued to one patient.
#[derive(Debug, Default)]
pub struct NoteRegistry {
    used: HashSet<String>,
}

impl NoteRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `note` unchanged when unused, otherwise extend it with ` (Variation N)` suffixes
    /// until the `condition_note` key is unique; the returned text is recorded as used.
    pub fn claim(&mut self, condition: &str, note: &str) -> String {
        let mut note = note.to_string();
        let mut count = 1;
        while self.used.contains(&note_key(condition, &note)) {
            note = format!("{note} (Variation {count})");
            count += 1;
        }
        self.used.insert(note_key(condition, &note));
        note
    }
}

fn note_key(condition: &str, note: &str) -> String {
    format!("{condition}_{note}")
}

/// Identity assigned to one condition group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePatient {
    /// Patient name.
    pub name: String,
    /// Date of birth, `YYYY-MM-DD`.
    pub dob: String,
    /// Postal address.
    pub address: String,
    /// National Health Index identifier.
    pub nhi: String,
    /// General practitioner, without the `Dr.` prefix.
    pub gp: String,
}

/// Build the bulk actions for one condition group, de-duplicating notes per patient.
pub fn build_actions(
    group: &ConditionGroup,
    patient: &NotePatient,
    index: &str,
    pipeline: &str,
) -> Result<Vec<BulkAction>, NotesError> {
    let age: i64 = group
        .age
        .trim()
        .parse()
        .map_err(|_| NotesError::InvalidAge {
            condition: group.condition.clone(),
            value: group.age.clone(),
        })?;
    let mut registry = NoteRegistry::new();
    let mut actions = Vec::with_capacity(group.visits.len());

    for visit in &group.visits {
        let note = registry.claim(&group.condition, &visit.note);
        let source = json!({
            "patient_name": patient.name,
            "dob": patient.dob,
            "patient_address": patient.address,
            "nhi": patient.nhi,
            "gp_name": format!("Dr. {}", patient.gp),
            "condition": group.condition,
            "gender": group.gender,
            "age": age,
            "note_date": visit.date.format(NOTE_DATE_FORMAT)?,
            "clinical_note": note,
        });
        let source = match source {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        actions.push(BulkAction::new(index, Some(pipeline.to_string()), source));
    }
    Ok(actions)
}

/// Result of a notes run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotesSummary {
    /// Actions generated across all groups.
    pub generated: usize,
    /// Upload counters; empty in simulate mode.
    pub tally: IngestTally,
}

/// Generates one synthetic patient per condition group and uploads its notes.
pub struct NotesIngestor<'a, W: BulkWriter + ?Sized, P: PersonSource + ?Sized> {
    writer: &'a W,
    people: &'a P,
    spec: &'a IndexSpec,
}

impl<'a, W: BulkWriter + ?Sized, P: PersonSource + ?Sized> NotesIngestor<'a, W, P> {
    /// Bind the ingestor to its collaborators.
    pub fn new(writer: &'a W, people: &'a P, spec: &'a IndexSpec) -> Self {
        Self {
            writer,
            people,
            spec,
        }
    }

    /// Generate and upload every group, one bulk request per condition.
    ///
    /// With `simulate` the actions are generated and a sample is logged per condition, but
    /// nothing is sent.
    pub async fn run(
        &self,
        groups: &[ConditionGroup],
        simulate: bool,
    ) -> Result<NotesSummary, NotesError> {
        let uploader = BulkUploader::new(self.writer, RetryPolicy::single_attempt(), usize::MAX);
        let mut summary = NotesSummary::default();

        for group in groups {
            let patient = self.next_patient().await;
            let actions = build_actions(group, &patient, &self.spec.index, &self.spec.pipeline)?;
            summary.generated += actions.len();
            tracing::debug!(
                condition = %group.condition,
                "Generated {} actions for condition: {}",
                actions.len(),
                group.condition
            );

            if simulate {
                if let Some(sample) = actions.first() {
                    let sample = Value::Object(sample.source.clone());
                    tracing::info!(
                        condition = %group.condition,
                        "Simulation mode: Not uploading to Elasticsearch. Sample action: {sample}"
                    );
                }
                continue;
            }

            let tally = uploader.upload_actions(&actions).await;
            tracing::debug!(
                condition = %group.condition,
                "Uploaded {} documents for condition: {}. Failed: {}",
                tally.succeeded,
                group.condition,
                tally.failed
            );
            summary.tally.merge(tally);
        }

        if !simulate {
            tracing::info!(
                "Total documents uploaded: {}, Total documents failed: {}",
                summary.tally.succeeded,
                summary.tally.failed
            );
        }
        Ok(summary)
    }

    async fn next_patient(&self) -> NotePatient {
        let person = self.people.person().await;
        let gp = self.people.person().await;
        let nhi = generate_nhi(&mut rand::thread_rng());
        tracing::debug!(nhi = %nhi, "Generated NHI");
        NotePatient {
            name: person.full_name,
            dob: person.dob,
            address: person.address,
            nhi,
            gp: gp.full_name,
        }
    }
}
