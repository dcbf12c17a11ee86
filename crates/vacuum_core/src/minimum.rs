use serde::{Deserialize, Serialize};

/// A located minimum of the potential: field values, the potential there, and
/// the minimizer's estimate of how far the value may still be from the true
/// minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialMinimum {
    field_configuration: Vec<f64>,
    function_value: f64,
    function_error: f64,
}

impl PotentialMinimum {
    pub fn new(field_configuration: Vec<f64>, function_value: f64, function_error: f64) -> Self {
        Self {
            field_configuration,
            function_value,
            function_error,
        }
    }

    pub fn field_configuration(&self) -> &[f64] {
        &self.field_configuration
    }

    pub fn function_value(&self) -> f64 {
        self.function_value
    }

    pub fn function_error(&self) -> f64 {
        self.function_error
    }

    pub fn number_of_fields(&self) -> usize {
        self.field_configuration.len()
    }

    /// True when neither the value nor its error is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.function_value.is_finite() && self.function_error.is_finite()
    }

    pub fn square_distance_to(&self, other: &PotentialMinimum) -> f64 {
        self.square_distance_to_point(&other.field_configuration)
    }

    pub fn square_distance_to_point(&self, point: &[f64]) -> f64 {
        self.field_configuration
            .iter()
            .zip(point)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Squared distance from the field origin.
    pub fn length_squared(&self) -> f64 {
        self.field_configuration.iter().map(|v| v * v).sum()
    }

    /// Deeper than `reference` even after adding this minimum's own error.
    pub fn is_deeper_than(&self, reference: &PotentialMinimum) -> bool {
        self.function_value + self.function_error < reference.function_value
    }

    /// Renders the minimum as `{ name -> value, ... }` with the potential value.
    pub fn describe(&self, field_names: &[String]) -> String {
        let fields: Vec<String> = self
            .field_configuration
            .iter()
            .enumerate()
            .map(|(i, value)| match field_names.get(i) {
                Some(name) => format!("{name} -> {value}"),
                None => format!("f{i} -> {value}"),
            })
            .collect();
        format!(
            "{{ {} }}, V = {} (± {})",
            fields.join(", "),
            self.function_value,
            self.function_error
        )
    }
}
