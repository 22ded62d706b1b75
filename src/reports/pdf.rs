//! PDF rendering of a blood report.
//!
//! Every line is drawn as a single text run so the text extracted by the ingest attachment
//! processor follows the layout the grok pattern expects.

use super::{BloodSample, ReportError, patient::Patient};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::io::BufWriter;

const LEFT: Mm = Mm(20.0);
const LINE: Mm = Mm(6.0);
const PARAGRAPH: Mm = Mm(4.0);

/// Render one sample as PDF bytes.
pub fn render_pdf(patient: &Patient, sample: &BloodSample) -> Result<Vec<u8>, ReportError> {
    let person = &patient.person;
    let (doc, page, layer) = PdfDocument::new("Blood Count", Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page).get_layer(layer);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|err| ReportError::Pdf(err.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|err| ReportError::Pdf(err.to_string()))?;

    let mut pen = Pen {
        layer: &layer,
        y: Mm(280.0),
    };

    pen.line("Random Lab", 12.0, &bold);
    pen.line("PO Box 12345, Faketown, New Zealand", 10.0, &font);
    pen.gap();

    pen.line(
        &format!("Patient: {} NHI: {}", person.full_name, patient.nhi),
        10.0,
        &font,
    );
    pen.gap();
    pen.line(
        &format!("Address: {} Sex: {}", person.address, person.sex),
        10.0,
        &font,
    );
    pen.gap();
    pen.line(
        &format!("Age: {} years Date of birth: {}", person.age, person.dob),
        10.0,
        &font,
    );
    pen.gap();
    pen.line(&format!("Lab: {}", patient.lab), 10.0, &font);
    pen.gap();

    pen.line("BLOOD COUNT", 16.0, &bold);
    pen.gap();
    pen.line(&format!("Date: {}", sample.collection_date), 10.0, &font);
    pen.line(&format!("Lab Numbers: {}", sample.lab_number), 10.0, &font);
    pen.gap();

    pen.line("Parameter Measurement Ref. Range", 10.0, &bold);
    for measurement in &sample.measurements {
        let parameter = measurement.parameter;
        pen.gap();
        pen.line(
            &format!(
                "{} {:.2} {} {}",
                parameter.name,
                measurement.value,
                ascii_unit(parameter.unit),
                parameter.reference_range()
            ),
            10.0,
            &font,
        );
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|err| ReportError::Pdf(err.to_string()))?;
    buf.into_inner()
        .map_err(|err| ReportError::Pdf(err.to_string()))
}

/// Spell superscript exponents with `^` so builtin fonts can draw them.
pub fn ascii_unit(unit: &str) -> String {
    let mut out = String::with_capacity(unit.len());
    let mut in_exponent = false;
    for ch in unit.chars() {
        let digit = match ch {
            '⁰' => Some('0'),
            '¹' => Some('1'),
            '²' => Some('2'),
            '³' => Some('3'),
            '⁴' => Some('4'),
            '⁵' => Some('5'),
            '⁶' => Some('6'),
            '⁷' => Some('7'),
            '⁸' => Some('8'),
            '⁹' => Some('9'),
            _ => None,
        };
        match digit {
            Some(digit) => {
                if !in_exponent {
                    out.push('^');
                    in_exponent = true;
                }
                out.push(digit);
            }
            None => {
                in_exponent = false;
                out.push(ch);
            }
        }
    }
    out
}

struct Pen<'a> {
    layer: &'a PdfLayerReference,
    y: Mm,
}

impl Pen<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        self.layer.use_text(text, size, LEFT, self.y, font);
        self.y -= LINE;
    }

    fn gap(&mut self) {
        self.y -= PARAGRAPH;
    }
}
