//! Console and CSV renderings of a blood report.

use super::{BloodSample, ReportError, patient::Patient};
use std::io::Write;

/// File name of the `index`-th (0-based) report for `full_name`.
pub fn report_file_name(full_name: &str, index: usize, year: i32, extension: &str) -> String {
    format!(
        "Report_{}_{}_{year}.{extension}",
        full_name.replace(' ', "_"),
        index + 1
    )
}

/// One line per measurement: `name (unit): value (lower - upper)`, with the range status unless
/// `silent`.
pub fn measurement_lines(sample: &BloodSample, silent: bool) -> String {
    let mut report = String::new();
    for measurement in &sample.measurements {
        let parameter = measurement.parameter;
        let line = format!(
            "{} ({}): {:.2} ({})",
            parameter.name,
            parameter.unit,
            measurement.value,
            parameter.reference_range()
        );
        report.push_str(&line);
        if !silent {
            let status = if measurement.is_within_range() {
                "within range"
            } else {
                "out of range"
            };
            report.push_str(" - ");
            report.push_str(status);
        }
        report.push('\n');
    }
    report
}

/// Full console report for one sample.
pub fn console_report(patient: &Patient, sample: &BloodSample, silent: bool) -> String {
    let person = &patient.person;
    format!(
        "Patient: {}\nNHI: {}\nAddress: {}\nSex: {}\nAge: {} years\nDate of birth: {}\nLab: {}\n\
         \nBLOOD COUNT\n\n\
         Date: {}\nLab Numbers: {}\n\n{}",
        person.full_name,
        patient.nhi,
        person.address,
        person.sex,
        person.age,
        person.dob,
        patient.lab,
        sample.collection_date,
        sample.lab_number,
        measurement_lines(sample, silent)
    )
}

/// Write the CSV rendering of one sample to `out` and hand the writer back.
///
/// Sections are separated by a bare newline rather than an empty CSV record.
pub fn write_csv<W: Write>(mut out: W, patient: &Patient, sample: &BloodSample) -> Result<W, ReportError> {
    let person = &patient.person;
    let age = format!("{} years", person.age);

    csv_section(&mut out, |writer| {
        writer.write_record(["Patient", person.full_name.as_str(), "NHI", patient.nhi.as_str()])?;
        writer.write_record(["Address", person.address.as_str(), "Sex", person.sex.as_str()])?;
        writer.write_record(["Age", age.as_str(), "Date of birth", person.dob.as_str()])?;
        writer.write_record(["Lab", patient.lab.as_str()])
    })?;
    out.write_all(b"\n")?;
    csv_section(&mut out, |writer| {
        writer.write_record(["BLOOD COUNT"])?;
        writer.write_record(["Date", sample.collection_date.as_str()])?;
        writer.write_record(["Lab Numbers", sample.lab_number.as_str()])
    })?;
    out.write_all(b"\n")?;
    csv_section(&mut out, |writer| {
        writer.write_record(["Parameter", "Measurement", "Ref. Range"])?;
        for measurement in &sample.measurements {
            let parameter = measurement.parameter;
            let value = format!("{:.2} {}", measurement.value, parameter.unit);
            writer.write_record([parameter.name, value.as_str(), parameter.reference_range().as_str()])?;
        }
        Ok(())
    })?;
    out.flush()?;
    Ok(out)
}

fn csv_section<W: Write>(
    out: &mut W,
    rows: impl FnOnce(&mut csv::Writer<&mut W>) -> csv::Result<()>,
) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    rows(&mut writer)?;
    writer.flush()?;
    Ok(())
}
