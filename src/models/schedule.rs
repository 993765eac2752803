// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Team schedule entries (matches, scrims, practice sessions).

use crate::error::AppError;
use crate::time_utils::month_label;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One event in the `schedules` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    /// Document ID (filled in on read)
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    pub title: String,
    /// Event date, `YYYY-MM-DD` (may carry a time suffix)
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub calendar_link: Option<String>,
}

/// Which part of the schedule to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleFilter {
    /// Today and later, soonest first
    #[default]
    Upcoming,
    /// Before today, most recent first
    Past,
    All,
}

impl FromStr for ScheduleFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Ok(ScheduleFilter::Upcoming),
            "past" => Ok(ScheduleFilter::Past),
            "all" => Ok(ScheduleFilter::All),
            other => Err(AppError::InvalidInput(format!(
                "Unknown schedule filter: {}",
                other
            ))),
        }
    }
}

impl ScheduleFilter {
    /// Whether an entry dated `date` belongs in this view relative to `today`.
    pub fn matches(&self, date: &str, today: &str) -> bool {
        let day = date.get(..10).unwrap_or(date);
        match self {
            ScheduleFilter::Upcoming => day >= today,
            ScheduleFilter::Past => day < today,
            ScheduleFilter::All => true,
        }
    }

    /// Past events are listed newest first.
    pub fn descending(&self) -> bool {
        matches!(self, ScheduleFilter::Past)
    }
}

/// Group entries under "Month YYYY" labels, keeping their order.
pub fn group_by_month(entries: &[ScheduleEntry]) -> Vec<(String, Vec<ScheduleEntry>)> {
    let mut groups: Vec<(String, Vec<ScheduleEntry>)> = Vec::new();

    for entry in entries {
        let label = month_label(&entry.date).unwrap_or_else(|| "Unscheduled".to_string());
        match groups.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, items)) => items.push(entry.clone()),
            None => groups.push((label, vec![entry.clone()])),
        }
    }

    groups
}
