//! Synthetic blood report generation.
//!
//! Each patient gets one identity from a [`PersonSource`], a random NHI and lab, and `samples`
//! blood counts for every year in the requested range. Reports are printed to the console or
//! written as PDF and/or CSV files.

pub mod parameters;
pub mod patient;
pub mod pdf;
pub mod render;

use parameters::{MAX_PERCENTAGE, Measurement, generate_measurements};
use patient::{Patient, PersonSource, generate_lab_number};
use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{Date, Month, macros::format_description};

/// Errors raised while generating or writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Filesystem or console write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV serialisation failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// PDF rendering failed.
    #[error("PDF error: {0}")]
    Pdf(String),
    /// Range widening bounds fall outside `0 <= min <= max <= MAX_PERCENTAGE`.
    #[error("Invalid percentage range: expected 0 <= min ({min}) <= max ({max}) <= {cap}", cap = MAX_PERCENTAGE)]
    InvalidPercentages {
        /// Requested minimum.
        min: f64,
        /// Requested maximum.
        max: f64,
    },
    /// Year range is inverted.
    #[error("Invalid year range: start {start} is after end {end}")]
    InvalidYears {
        /// First year.
        start: i32,
        /// Last year.
        end: i32,
    },
    /// A collection date could not be built for the requested year.
    #[error("Invalid collection date: {0}")]
    InvalidDate(#[from] time::error::ComponentRange),
    /// Collection date could not be formatted.
    #[error("Failed to format collection date: {0}")]
    Format(#[from] time::error::Format),
}

/// One blood count for one patient.
#[derive(Debug, Clone, PartialEq)]
pub struct BloodSample {
    /// Year the sample belongs to.
    pub year: i32,
    /// One value per catalogue parameter.
    pub measurements: Vec<Measurement>,
    /// Collection date, `DD/MM/YYYY`.
    pub collection_date: String,
    /// Lab number printed on the report.
    pub lab_number: String,
}

/// Knobs of a report generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    /// Patients to generate.
    pub patients: usize,
    /// Samples per patient per year.
    pub samples: usize,
    /// First year (inclusive).
    pub start_year: i32,
    /// Last year (inclusive).
    pub end_year: i32,
    /// Lower bound of the range widening, in percent.
    pub percentage_min: f64,
    /// Upper bound of the range widening, in percent.
    pub percentage_max: f64,
    /// Omit the within/out of range status on console reports.
    pub silent: bool,
    /// Write PDF files.
    pub to_pdf: bool,
    /// Write CSV files.
    pub to_csv: bool,
    /// Directory receiving PDF/CSV files.
    pub output_dir: PathBuf,
}

impl ReportOptions {
    /// Reject inverted year ranges and percentage ranges outside `0..=MAX_PERCENTAGE`.
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.start_year > self.end_year {
            return Err(ReportError::InvalidYears {
                start: self.start_year,
                end: self.end_year,
            });
        }
        let percentages_valid = self.percentage_min.is_finite()
            && self.percentage_max.is_finite()
            && 0.0 <= self.percentage_min
            && self.percentage_min <= self.percentage_max
            && self.percentage_max <= MAX_PERCENTAGE;
        if !percentages_valid {
            return Err(ReportError::InvalidPercentages {
                min: self.percentage_min,
                max: self.percentage_max,
            });
        }
        Ok(())
    }
}

/// Generate `samples` blood counts for every year in `start_year..=end_year`.
pub fn generate_samples<R: Rng + ?Sized>(
    rng: &mut R,
    options: &ReportOptions,
) -> Result<Vec<BloodSample>, ReportError> {
    let format = format_description!("[day]/[month]/[year]");
    let mut samples = Vec::new();
    for year in options.start_year..=options.end_year {
        for _ in 0..options.samples {
            let measurements =
                generate_measurements(rng, options.percentage_min, options.percentage_max);
            let month = Month::try_from(rng.gen_range(1..=12u8))?;
            let date = Date::from_calendar_date(year, month, rng.gen_range(1..=28))?;
            samples.push(BloodSample {
                year,
                measurements,
                collection_date: date.format(format)?,
                lab_number: generate_lab_number(rng),
            });
        }
    }
    Ok(samples)
}

/// Drives a generation run.
pub struct ReportGenerator<'a, P: PersonSource + ?Sized> {
    people: &'a P,
    options: ReportOptions,
}

impl<'a, P: PersonSource + ?Sized> ReportGenerator<'a, P> {
    /// Validate `options` and bind them to an identity source.
    pub fn new(people: &'a P, options: ReportOptions) -> Result<Self, ReportError> {
        options.validate()?;
        Ok(Self { people, options })
    }

    /// Generate every patient; console reports go to `console`, files to the output directory.
    ///
    /// Returns the paths of the files written.
    pub async fn run<W: Write>(&self, console: &mut W) -> Result<Vec<PathBuf>, ReportError> {
        let options = &self.options;
        let writes_files = options.to_pdf || options.to_csv;
        if writes_files && !options.output_dir.exists() {
            std::fs::create_dir_all(&options.output_dir)?;
            tracing::info!(dir = %options.output_dir.display(), "Created output directory");
        }

        let mut written = Vec::new();
        for _ in 0..options.patients {
            let person = self.people.person().await;
            let (patient, samples) = {
                let mut rng = rand::thread_rng();
                let patient = Patient::from_person(person, &mut rng);
                let samples = generate_samples(&mut rng, options)?;
                (patient, samples)
            };

            if options.to_pdf {
                written.extend(self.write_files(&patient, &samples, "pdf")?);
            }
            if options.to_csv {
                written.extend(self.write_files(&patient, &samples, "csv")?);
            }
            if !writes_files {
                for sample in &samples {
                    writeln!(
                        console,
                        "{}",
                        render::console_report(&patient, sample, options.silent)
                    )?;
                }
            }
        }
        Ok(written)
    }

    fn write_files(
        &self,
        patient: &Patient,
        samples: &[BloodSample],
        extension: &str,
    ) -> Result<Vec<PathBuf>, ReportError> {
        let mut written = Vec::with_capacity(samples.len());
        for (index, sample) in samples.iter().enumerate() {
            let name =
                render::report_file_name(&patient.person.full_name, index, sample.year, extension);
            let path = self.options.output_dir.join(name);
            match extension {
                "pdf" => std::fs::write(&path, pdf::render_pdf(patient, sample)?)?,
                _ => write_csv_file(&path, patient, sample)?,
            }
            tracing::info!(path = %path.display(), "Report saved as {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn write_csv_file(path: &Path, patient: &Patient, sample: &BloodSample) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    let mut file = render::write_csv(std::io::BufWriter::new(file), patient, sample)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patient::RandomPerson;
    use rand::{SeedableRng, rngs::StdRng};

    struct FixedPeople;

    #[async_trait]
    impl PersonSource for FixedPeople {
        async fn person(&self) -> RandomPerson {
            RandomPerson {
                full_name: "Ana Smith".into(),
                ..RandomPerson::fallback()
            }
        }
    }

    fn options(output_dir: &Path) -> ReportOptions {
        ReportOptions {
            patients: 1,
            samples: 2,
            start_year: 2021,
            end_year: 2022,
            percentage_min: 0.0,
            percentage_max: 10.0,
            silent: false,
            to_pdf: false,
            to_csv: false,
            output_dir: output_dir.to_path_buf(),
        }
    }

    #[test]
    fn samples_cover_every_year() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples = generate_samples(&mut rng, &options(Path::new("."))).expect("samples");

        assert_eq!(samples.len(), 4);
        assert_eq!(samples.iter().filter(|s| s.year == 2021).count(), 2);
        for sample in &samples {
            let (day, rest) = sample.collection_date.split_once('/').expect("date");
            let day: u8 = day.parse().expect("day");
            assert!((1..=28).contains(&day));
            assert!(rest.ends_with(&sample.year.to_string()));
            assert_eq!(sample.lab_number.len(), 10);
            assert_eq!(sample.measurements.len(), 12);
        }
    }

    #[test]
    fn inverted_percentages_are_rejected() {
        let mut options = options(Path::new("."));
        options.percentage_min = 20.0;
        options.percentage_max = 5.0;
        assert!(matches!(
            options.validate(),
            Err(ReportError::InvalidPercentages { .. })
        ));
    }

    #[test]
    fn overflowing_percentages_are_rejected() {
        let mut options = options(Path::new("."));
        options.percentage_max = 1e307;
        assert!(matches!(
            options.validate(),
            Err(ReportError::InvalidPercentages { .. })
        ));

        options.percentage_max = MAX_PERCENTAGE;
        assert!(options.validate().is_ok());
    }

    #[tokio::test]
    async fn console_mode_prints_every_sample() {
        let options = options(Path::new("."));
        let generator = ReportGenerator::new(&FixedPeople, options).expect("generator");
        let mut console = Vec::new();

        let written = generator.run(&mut console).await.expect("run");

        assert!(written.is_empty());
        let text = String::from_utf8(console).expect("utf8");
        assert_eq!(text.matches("Patient: Ana Smith").count(), 4);
        assert!(text.contains("range\n"));
    }

    #[tokio::test]
    async fn file_mode_creates_directory_and_names_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("reports");
        let mut options = options(&output);
        options.end_year = 2021;
        options.to_pdf = true;
        options.to_csv = true;

        let generator = ReportGenerator::new(&FixedPeople, options).expect("generator");
        let mut console = Vec::new();
        let written = generator.run(&mut console).await.expect("run");

        assert!(console.is_empty());
        assert_eq!(written.len(), 4);
        assert!(output.join("Report_Ana_Smith_1_2021.pdf").exists());
        assert!(output.join("Report_Ana_Smith_2_2021.csv").exists());
    }
}
