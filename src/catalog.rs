//! Filter and LED wavelength labels as configured for this wheel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::Position;

/// Extract the first run of decimal digits from a label such as `"365nm"`.
///
/// Returns `None` when the label has no digits. A run longer than `u64`
/// can hold (over 19 digits) is not a wavelength and also yields `None`.
pub fn parse_wavelength_label(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WavelengthCatalog {
    filters: BTreeMap<Position, String>,
    leds: Vec<String>,
}

impl WavelengthCatalog {
    pub fn new(filters: BTreeMap<Position, String>, leds: Vec<String>) -> Self {
        Self { filters, leds }
    }

    pub fn filter_label(&self, position: Position) -> Option<&str> {
        self.filters.get(&position).map(String::as_str)
    }

    /// Configured slots in wheel order.
    pub fn slots(&self) -> impl Iterator<Item = (Position, &str)> {
        self.filters.iter().map(|(p, label)| (*p, label.as_str()))
    }

    pub fn led_labels(&self) -> &[String] {
        &self.leds
    }

    pub fn slot_for_label(&self, label: &str) -> Option<Position> {
        self.slots().find(|(_, l)| *l == label).map(|(p, _)| p)
    }

    /// Emission filters usable with the given excitation source: the filter
    /// wavelength must be strictly longer than the excitation wavelength.
    pub fn compatible_filters(&self, excitation_label: &str) -> Vec<(Position, &str)> {
        let Some(excitation) = parse_wavelength_label(excitation_label) else {
            return Vec::new();
        };
        self.slots()
            .filter(|(_, label)| parse_wavelength_label(label).is_some_and(|nm| nm > excitation))
            .collect()
    }
}
