//! Extraction of the patient identifier and blood parameters from a chart request.

use crate::llm::ChatRequest;

const SYSTEM: &str = "You are a helpful assistant that extracts patient information and requested \
                      blood parameters from queries.";

/// Parameters charted when the user does not name any.
pub const DEFAULT_PARAMETERS: [&str; 9] = [
    "haemoglobin",
    "wbc",
    "rbc",
    "platelets",
    "neutrophils",
    "lymphocytes",
    "monocytes",
    "eosinophils",
    "basophils",
];

/// Patient and parameters named in a chart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientQuery {
    /// Patient name, when given.
    pub name: Option<String>,
    /// NHI, when given.
    pub nhi: Option<String>,
    /// Requested parameter columns.
    pub parameters: Vec<String>,
}

impl PatientQuery {
    /// Name if present, otherwise NHI.
    pub fn identifier(&self) -> Option<&str> {
        self.name.as_deref().or(self.nhi.as_deref())
    }

    /// `WHERE` condition the generated SQL must use.
    pub fn filter_clause(&self) -> String {
        match (&self.name, &self.nhi) {
            (Some(name), _) => format!("MATCH(patient_name, '{name}')"),
            (None, Some(nhi)) => format!("nhi = '{nhi}'"),
            (None, None) => String::new(),
        }
    }
}

/// Completion request asking the model to extract the patient and parameters from `query`.
pub fn extraction_request(query: &str) -> ChatRequest {
    let prompt = format!(
        "Extract the following information from the query:\n\
         1. Patient name (if available)\n\
         2. NHI (if available)\n\
         3. Requested blood parameters (from the list: {})\n\n\
         Query: {query}\n\n\
         Respond in the format:\n\
         Patient Name: <extracted name or None>\n\
         NHI: <extracted NHI or None>\n\
         Blood Parameters: <comma-separated list of requested parameters or 'All' if not specified>",
        DEFAULT_PARAMETERS.join(", ")
    );
    ChatRequest::new(SYSTEM, prompt, 100, 0.3)
}

/// Parse the three `Label: value` lines of the model's answer.
///
/// `None` or missing values are absent; `All` or missing parameters mean [`DEFAULT_PARAMETERS`].
pub fn parse_extraction(answer: &str) -> PatientQuery {
    let mut lines = answer.trim().lines();
    let mut next_value = || {
        lines
            .next()
            .and_then(|line| line.split_once(':'))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("none"))
    };
    let name = next_value();
    let nhi = next_value();
    let parameters = match next_value() {
        Some(list) if !list.eq_ignore_ascii_case("all") && !list.eq_ignore_ascii_case("'all'") => list
            .split(',')
            .map(|param| param.trim().to_string())
            .filter(|param| !param.is_empty())
            .collect(),
        _ => DEFAULT_PARAMETERS.iter().map(|p| p.to_string()).collect(),
    };
    PatientQuery {
        name,
        nhi,
        parameters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_nhi_and_parameters() {
        let query = parse_extraction(
            "Patient Name: Hine Walker\nNHI: ABC1234\nBlood Parameters: haemoglobin, wbc",
        );
        assert_eq!(query.name.as_deref(), Some("Hine Walker"));
        assert_eq!(query.nhi.as_deref(), Some("ABC1234"));
        assert_eq!(query.parameters, ["haemoglobin", "wbc"]);
        assert_eq!(query.filter_clause(), "MATCH(patient_name, 'Hine Walker')");
    }

    #[test]
    fn none_values_are_absent_and_all_expands_to_defaults() {
        let query = parse_extraction("Patient Name: None\nNHI: XYZ9876\nBlood Parameters: All");
        assert_eq!(query.name, None);
        assert_eq!(query.identifier(), Some("XYZ9876"));
        assert_eq!(query.filter_clause(), "nhi = 'XYZ9876'");
        assert_eq!(query.parameters.len(), 9);
    }

    #[test]
    fn truncated_answer_degrades_to_defaults() {
        let query = parse_extraction("Patient Name: None");
        assert_eq!(query.identifier(), None);
        assert_eq!(query.parameters, DEFAULT_PARAMETERS);

        let garbage = parse_extraction("I cannot help with that");
        assert_eq!(garbage.name, None);
        assert_eq!(garbage.nhi, None);
    }
}
