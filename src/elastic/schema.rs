//! Index mappings and ingest pipeline definitions.
//!
//! Both document families embed a summary string with the ELSER model at ingest time; the
//! summary is assembled by a Painless script and removed again once `text_embedding` is filled.

use crate::config::Config;
use serde_json::{Value, json};

/// An index together with the ingest pipeline that feeds it.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Index name.
    pub index: String,
    /// Ingest pipeline id.
    pub pipeline: String,
    /// Body sent when creating the index.
    pub index_body: Value,
    /// Body sent when storing the pipeline.
    pub pipeline_body: Value,
}

/// Fields extracted by grok from the blood report text, paired with their row label.
const BLOOD_FIELDS: [(&str, &str); 12] = [
    ("Haemoglobin", "haemoglobin"),
    ("RBC", "rbc"),
    ("HCT", "hct"),
    ("MCV", "mcv"),
    ("MCH", "mch"),
    ("Platelets", "platelets"),
    ("WBC", "wbc"),
    ("Neutrophils", "neutrophils"),
    ("Lymphocytes", "lymphocytes"),
    ("Monoocytes", "monocytes"),
    ("Eosinophils", "eosinophils"),
    ("Basophils", "basophils"),
];

/// Index and pipeline for uploaded PDF blood reports.
pub fn blood_report_spec(config: &Config) -> IndexSpec {
    IndexSpec {
        index: config.index_name.clone(),
        pipeline: config.pipeline_name.clone(),
        index_body: blood_report_mappings(),
        pipeline_body: blood_report_pipeline(&config.elser_model),
    }
}

/// Index and pipeline for synthetic clinical notes.
pub fn clinical_notes_spec(config: &Config) -> IndexSpec {
    IndexSpec {
        index: config.notes_index_name(),
        pipeline: config.notes_pipeline_name(),
        index_body: clinical_notes_mappings(),
        pipeline_body: clinical_notes_pipeline(&config.elser_model),
    }
}

fn blood_report_mappings() -> Value {
    let mut properties = json!({
        "patient_name": { "type": "text" },
        "nhi": { "type": "keyword" },
        "address": { "type": "text" },
        "sex": { "type": "keyword" },
        "age": { "type": "integer" },
        "dob": { "type": "date", "format": "yyyy-MM-dd" },
        "lab": { "type": "keyword" },
        "test_date": { "type": "date", "format": "dd/MM/yyyy" },
        "lab_numbers": { "type": "keyword" },
        "file_name": { "type": "keyword" },
        "text_embedding": { "type": "sparse_vector" }
    });
    if let Some(object) = properties.as_object_mut() {
        for (_, field) in BLOOD_FIELDS {
            object.insert(field.to_string(), json!({ "type": "float" }));
            object.insert(format!("{field}_range"), json!({ "type": "keyword" }));
        }
    }
    json!({ "mappings": { "properties": properties } })
}

/// Grok pattern matching the text the attachment processor extracts from a rendered report.
pub fn blood_report_grok_pattern() -> String {
    let mut pattern = String::from(
        "Random Lab\\nPO Box \\d+, \\w+, \\w+ \\w+\\n\\n\
         Patient: %{DATA:patient_name} NHI: %{DATA:nhi}\\n\\n\
         Address: %{DATA:address} Sex: %{WORD:sex}\\n\\n\
         Age: %{NUMBER:age:int} years Date of birth: %{DATA:dob}\\n\\n\
         Lab: %{DATA:lab}\\n\\n\
         BLOOD COUNT\\n\\n\
         Date: %{DATA:test_date}\\n\
         Lab Numbers: %{DATA:lab_numbers}\\n\\n\
         Parameter Measurement Ref. Range",
    );
    for (label, field) in BLOOD_FIELDS {
        pattern.push_str(&format!(
            "\\n\\n{label} %{{NUMBER:{field}:float}} %{{NOTSPACE}} %{{DATA:{field}_range}}"
        ));
    }
    pattern.push('$');
    pattern
}

fn blood_report_pipeline(elser_model: &str) -> Value {
    let mut script = String::from(
        "ctx.clinical_data = 'Patient Name: ' + ctx.patient_name + ', ' + 'NHI: ' + ctx.nhi",
    );
    for (label, field) in BLOOD_FIELDS {
        script.push_str(&format!(" + ', ' + '{label}: ' + ctx.{field}"));
    }
    script.push(';');

    json!({
        "description": "Extract attachment information and specific fields",
        "processors": [
            { "attachment": { "field": "data", "target_field": "attachment", "indexed_chars": -1 } },
            { "grok": { "field": "attachment.content", "patterns": [ blood_report_grok_pattern() ] } },
            { "script": { "source": script } },
            inference_processor(elser_model),
            { "remove": { "field": [ "data", "attachment.content", "clinical_data" ] } }
        ]
    })
}

fn clinical_notes_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "patient_name": { "type": "text" },
                "dob": { "type": "date", "format": "yyyy-MM-dd" },
                "patient_address": { "type": "text" },
                "nhi": { "type": "keyword" },
                "gp_name": { "type": "text" },
                "condition": { "type": "keyword" },
                "gender": { "type": "keyword" },
                "age": { "type": "integer" },
                "note_date": { "type": "date", "format": "yyyy-MM-dd" },
                "clinical_note": { "type": "text" },
                "text_embedding": { "type": "sparse_vector" }
            }
        }
    })
}

fn clinical_notes_pipeline(elser_model: &str) -> Value {
    let script = [
        ("Patient Name", "patient_name"),
        ("DOB", "dob"),
        ("NHI", "nhi"),
        ("GP Name", "gp_name"),
        ("Condition", "condition"),
        ("Gender", "gender"),
        ("Age", "age"),
        ("Note Date", "note_date"),
        ("Clinical Note", "clinical_note"),
    ]
    .iter()
    .map(|(label, field)| format!("'{label}: ' + ctx.{field}"))
    .collect::<Vec<_>>()
    .join(" + ', ' + ");

    json!({
        "description": "Process clinical notes",
        "processors": [
            { "script": { "source": format!("ctx.clinical_data = {script};") } },
            inference_processor(elser_model),
            { "remove": { "field": [ "clinical_data" ] } }
        ]
    })
}

fn inference_processor(model_id: &str) -> Value {
    json!({
        "inference": {
            "model_id": model_id,
            "input_output": [
                { "input_field": "clinical_data", "output_field": "text_embedding" }
            ]
        }
    })
}
