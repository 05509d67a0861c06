use std::rc::Rc;

use anyhow::{Context, Result};
use prettytable::{Table, format::consts::FORMAT_CLEAN, row};
use serde::Serialize;

use crate::resource::ReadError;
use crate::settings::KeyRequest;

/// The outcome of resolving a single key.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Outcome {
    pub resource: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn new(request: &KeyRequest, outcome: Result<Rc<str>, ReadError>) -> Self {
        let (value, error) = match outcome {
            Ok(value) => (Some(value.to_string()), None),
            Err(error) => (None, Some(error.to_string())),
        };
        Self {
            resource: request.resource.clone(),
            key: request.key.clone(),
            value,
            error,
        }
    }
}

pub fn print_json(outcomes: &[Outcome]) -> Result<()> {
    let json = serde_json::to_string_pretty(outcomes).context("Could not serialize outcomes")?;
    println!("{json}");
    Ok(())
}

pub fn print_compact(outcomes: &[Outcome]) {
    if outcomes.is_empty() {
        return;
    }
    compact_table(outcomes).printstd();
}

fn compact_table(outcomes: &[Outcome]) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "Resource", "Key", "Status", "Value"]);

    for outcome in outcomes {
        let (status, detail) = match (&outcome.value, &outcome.error) {
            (Some(value), _) => ("ok", first_line(value)),
            (None, Some(error)) => ("failed", error.as_str()),
            (None, None) => ("", ""),
        };
        table.add_row(row![outcome.resource, outcome.key, status, detail]);
    }

    table
}

fn first_line(value: &str) -> &str {
    value.lines().next().unwrap_or_default()
}
