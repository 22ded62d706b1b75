//! Blood parameter catalogue and synthetic measurements.

use rand::Rng;

/// A measured blood parameter with its inclusive reference range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloodParameter {
    /// Row label printed on the report.
    pub name: &'static str,
    /// Measurement unit.
    pub unit: &'static str,
    /// Inclusive lower reference bound.
    pub lower: f64,
    /// Inclusive upper reference bound.
    pub upper: f64,
}

/// Largest range widening accepted, in percent of the reference width.
pub const MAX_PERCENTAGE: f64 = 1000.0;

/// The twelve parameters of a full blood count, in report order.
pub const BLOOD_PARAMETERS: [BloodParameter; 12] = [
    BloodParameter::new("Haemoglobin", "g/L", 130.0, 175.0),
    BloodParameter::new("RBC", "x10¹²/L", 4.30, 6.00),
    BloodParameter::new("HCT", "N/A", 0.40, 0.52),
    BloodParameter::new("MCV", "fL", 80.0, 99.0),
    BloodParameter::new("MCH", "pg", 27.0, 33.0),
    BloodParameter::new("Platelets", "x10⁹/L", 150.0, 400.0),
    BloodParameter::new("WBC", "x10⁹/L", 4.0, 11.0),
    BloodParameter::new("Neutrophils", "x10⁹/L", 1.90, 7.50),
    BloodParameter::new("Lymphocytes", "x10⁹/L", 1.00, 4.00),
    BloodParameter::new("Monoocytes", "x10⁹/L", 0.20, 1.00),
    BloodParameter::new("Eosinophils", "x10⁹/L", 0.00, 0.51),
    BloodParameter::new("Basophils", "x10⁹/L", 0.00, 0.20),
];

impl BloodParameter {
    const fn new(name: &'static str, unit: &'static str, lower: f64, upper: f64) -> Self {
        Self {
            name,
            unit,
            lower,
            upper,
        }
    }

    /// Draw a value from the reference range widened on both sides by a random share of its width.
    ///
    /// The share is uniform in `[percentage_min, percentage_max]` percent, with both bounds
    /// clamped to `0..=MAX_PERCENTAGE` and an inverted pair collapsed onto the minimum.
    pub fn generate_value<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        percentage_min: f64,
        percentage_max: f64,
    ) -> f64 {
        let low = clamp_percentage(percentage_min);
        let high = clamp_percentage(percentage_max).max(low);
        let percentage = rng.gen_range(low..=high);
        let extension = (self.upper - self.lower) * percentage / 100.0;
        rng.gen_range((self.lower - extension)..=(self.upper + extension))
    }

    /// Whether `value` lies inside the reference range, bounds included.
    pub fn is_within_range(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Reference range as printed on reports, e.g. `4.3 - 6`.
    pub fn reference_range(&self) -> String {
        format!("{} - {}", self.lower, self.upper)
    }
}

fn clamp_percentage(percentage: f64) -> f64 {
    if percentage.is_nan() {
        0.0
    } else {
        percentage.clamp(0.0, MAX_PERCENTAGE)
    }
}

/// One generated value for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Parameter measured.
    pub parameter: BloodParameter,
    /// Generated value.
    pub value: f64,
}

impl Measurement {
    /// Whether the value is inside the parameter's reference range.
    pub fn is_within_range(&self) -> bool {
        self.parameter.is_within_range(self.value)
    }
}

/// Generate one measurement per catalogue parameter.
pub fn generate_measurements<R: Rng + ?Sized>(
    rng: &mut R,
    percentage_min: f64,
    percentage_max: f64,
) -> Vec<Measurement> {
    BLOOD_PARAMETERS
        .iter()
        .map(|parameter| Measurement {
            parameter: *parameter,
            value: parameter.generate_value(rng, percentage_min, percentage_max),
        })
        .collect()
}
