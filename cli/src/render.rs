//! Plain-text rendering of the garage.

use std::fmt::Write as _;

use garage_core::model::{Motorcycle, Reminder, ServiceLog, TechData};
use garage_core::state::DependentRecord;
use garage_core::{GarageConfig, GarageState};

/// One-line summary of a dependent record.
pub(crate) trait Line {
    /// Plural label used in headings.
    const LABEL: &'static str;

    fn line(&self) -> String;
}

impl Line for ServiceLog {
    const LABEL: &'static str = "service logs";

    fn line(&self) -> String {
        format!(
            "{}  {}  {} km  {}  {:.2}",
            self.id,
            self.date,
            self.mileage,
            self.service_type,
            self.total_cost()
        )
    }
}

impl Line for Reminder {
    const LABEL: &'static str = "reminders";

    fn line(&self) -> String {
        format!("{}  {} ({})", self.id, self.description, self.due_info)
    }
}

impl Line for TechData {
    const LABEL: &'static str = "tech data";

    fn line(&self) -> String {
        format!("{}  {}: {}", self.id, self.data_type, self.value)
    }
}

pub(crate) fn motorcycle_line(bike: &Motorcycle, selected: bool) -> String {
    let marker = if selected { "*" } else { " " };
    let photo = if bike.photo.is_some() { "  [photo]" } else { "" };
    format!(
        "{marker} {}  {}  {} {} ({}){photo}",
        bike.id, bike.nickname, bike.brand, bike.model, bike.year
    )
}

pub(crate) fn motorcycles(state: &GarageState) -> String {
    if !state.has_motorcycles() {
        return "No motorcycles yet; add one with `garage bikes add`.\n".to_string();
    }
    let mut out = String::new();
    for bike in state.motorcycles() {
        let selected = state.selected_id() == Some(bike.id.as_str());
        let _ = writeln!(out, "{}", motorcycle_line(bike, selected));
    }
    out
}

pub(crate) fn dependents<T: DependentRecord + Line>(state: &GarageState) -> String {
    let Some(bike) = state.selected_motorcycle() else {
        return "No motorcycle selected.\n".to_string();
    };
    let records = state.dependents::<T>();
    if records.is_empty() {
        return format!("No {} for {}.\n", T::LABEL, bike.nickname);
    }
    let mut out = format!("{} for {}:\n", capitalize(T::LABEL), bike.nickname);
    for record in records {
        let _ = writeln!(out, "  {}", record.line());
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn status(config: &GarageConfig, state: &GarageState) -> String {
    let mut out = String::new();
    let owner = state
        .owner()
        .map_or_else(|| "(signed out)".to_string(), ToString::to_string);
    let _ = writeln!(out, "Owner:       {owner}");
    let _ = writeln!(out, "Config home: {}", config.config_home.display());
    let _ = writeln!(out, "Data dir:    {}", config.data_dir.display());
    let _ = writeln!(out, "Motorcycles: {}", state.motorcycles().len());
    match state.selected_motorcycle() {
        Some(bike) => {
            let _ = writeln!(out, "Selected:    {} ({})", bike.nickname, bike.id);
            let _ = writeln!(
                out,
                "Records:     {} service logs, {} reminders, {} tech data",
                state.service_logs().len(),
                state.reminders().len(),
                state.tech_data().len()
            );
        }
        None => {
            let _ = writeln!(out, "Selected:    none");
        }
    }
    out
}

pub(crate) fn status_json(config: &GarageConfig, state: &GarageState) -> serde_json::Value {
    serde_json::json!({
        "owner": state.owner(),
        "configHome": config.config_home,
        "dataDir": config.data_dir,
        "motorcycles": state.motorcycles().len(),
        "selected": state.selected_id(),
        "serviceLogs": state.service_logs().len(),
        "reminders": state.reminders().len(),
        "techData": state.tech_data().len(),
        "image": config.image,
    })
}
