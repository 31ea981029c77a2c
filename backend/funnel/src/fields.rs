//! Form field state and the completion gate derived from it.

use std::str::FromStr;

use serde::Serialize;

use crate::format::{format_currency, format_phone};

/// The four inputs of the quote form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Name,
    Phone,
    City,
    MonthlyEnergyCost,
}

impl FieldKey {
    pub const ALL: [FieldKey; 4] = [
        FieldKey::Name,
        FieldKey::Phone,
        FieldKey::City,
        FieldKey::MonthlyEnergyCost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::City => "city",
            Self::MonthlyEnergyCost => "monthly_energy_cost",
        }
    }
}

impl FromStr for FieldKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

/// Display-ready values of the lead being captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadInput {
    pub name: String,
    pub phone: String,
    pub city: String,
    pub monthly_energy_cost: String,
}

impl LeadInput {
    pub fn get(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::Name => &self.name,
            FieldKey::Phone => &self.phone,
            FieldKey::City => &self.city,
            FieldKey::MonthlyEnergyCost => &self.monthly_energy_cost,
        }
    }

    fn slot(&mut self, key: FieldKey) -> &mut String {
        match key {
            FieldKey::Name => &mut self.name,
            FieldKey::Phone => &mut self.phone,
            FieldKey::City => &mut self.city,
            FieldKey::MonthlyEnergyCost => &mut self.monthly_energy_cost,
        }
    }

    /// True when every field is non-empty after trimming.
    pub fn is_complete(&self) -> bool {
        FieldKey::ALL
            .iter()
            .all(|key| !self.get(*key).trim().is_empty())
    }
}

/// Holds the current form values and keeps `complete` in step with them.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    lead: LeadInput,
    complete: bool,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise `raw` for `key`, store it, and recompute completion.
    pub fn set_field(&mut self, key: FieldKey, raw: &str) {
        let value = match key {
            FieldKey::Phone => format_phone(raw),
            FieldKey::MonthlyEnergyCost => format_currency(raw).unwrap_or_else(|| raw.to_string()),
            FieldKey::Name | FieldKey::City => raw.to_string(),
        };
        *self.lead.slot(key) = value;
        self.complete = self.lead.is_complete();
    }

    /// Empty every field.
    pub fn clear(&mut self) {
        self.lead = LeadInput::default();
        self.complete = false;
    }

    pub fn lead(&self) -> &LeadInput {
        &self.lead
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_fills_and_formats() {
        let mut store = FieldStore::new();
        store.set_field(FieldKey::Name, "Ana");
        store.set_field(FieldKey::Phone, "67999998888");
        store.set_field(FieldKey::City, "Dourados");
        store.set_field(FieldKey::MonthlyEnergyCost, "15000");

        assert_eq!(store.lead().phone, "(67) 99999-8888");
        assert_eq!(store.lead().monthly_energy_cost, "150,00");
        assert!(store.is_complete());
    }

    #[test]
    fn completion_over_every_permutation() {
        for mask in 0u8..16 {
            let mut store = FieldStore::new();
            for (bit, key) in FieldKey::ALL.iter().enumerate() {
                let value = if mask & (1 << bit) != 0 { "12345678" } else { "   " };
                store.set_field(*key, value);
            }
            assert_eq!(store.is_complete(), mask == 0b1111, "mask {mask:04b}");
        }
    }

    #[test]
    fn cost_without_digits_is_stored_raw() {
        let mut store = FieldStore::new();
        store.set_field(FieldKey::MonthlyEnergyCost, "");
        assert_eq!(store.lead().monthly_energy_cost, "");
        store.set_field(FieldKey::MonthlyEnergyCost, "R$");
        assert_eq!(store.lead().monthly_energy_cost, "R$");
    }

    #[test]
    fn name_and_city_are_verbatim() {
        let mut store = FieldStore::new();
        store.set_field(FieldKey::Name, "  Ana Maria ");
        store.set_field(FieldKey::City, "Campo Grande (MS)");
        assert_eq!(store.lead().name, "  Ana Maria ");
        assert_eq!(store.lead().city, "Campo Grande (MS)");
    }

    #[test]
    fn clearing_reopens_the_gate() {
        let mut store = FieldStore::new();
        for key in FieldKey::ALL {
            store.set_field(key, "1234567");
        }
        assert!(store.is_complete());
        store.clear();
        assert!(!store.is_complete());
        assert_eq!(store.lead(), &LeadInput::default());
    }

    #[test]
    fn field_key_round_trips_wire_names() {
        for key in FieldKey::ALL {
            assert_eq!(key.as_str().parse::<FieldKey>(), Ok(key));
        }
        assert!("telefone".parse::<FieldKey>().is_err());
    }
}
