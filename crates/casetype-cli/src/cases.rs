//! Case store maintenance: list, look up, add and delete records.
use anyhow::{bail, Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::path::Path;

use casetype_classifiers::data_handling::{CaseRecord, RawCaseRecord};
use casetype_classifiers::io::{CaseStore, JsonFileStore};

use crate::util::print_json;

pub fn run_list(store: &JsonFileStore) -> Result<()> {
    print_json(&store.list_cases()?)
}

pub fn run_get(store: &JsonFileStore, case_date: &str) -> Result<()> {
    match store.find_case(case_date)? {
        Some(case) => print_json(&case),
        None => bail!("Case not found: {}", case_date),
    }
}

pub fn run_delete(store: &JsonFileStore, case_date: &str) -> Result<()> {
    if !store.delete_case(case_date)? {
        bail!("Case not found: {}", case_date);
    }
    Ok(())
}

/// Validate every record in `path` (one object or an array) before storing any.
pub fn run_add<P: AsRef<Path>>(store: &JsonFileStore, path: P) -> Result<Vec<CaseRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read case file: {}", path.display()))?;
    let body: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse case file: {}", path.display()))?;
    let items = match body {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut cases = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let raw: RawCaseRecord = serde_json::from_value(item)
            .with_context(|| format!("Case {} is not a JSON object", i))?;
        let case = raw
            .validate()
            .with_context(|| format!("Case {} is invalid", i))?;
        cases.push(case);
    }
    store.insert_cases(&cases)?;
    info!("Added {} cases to {}", cases.len(), store.path().display());
    Ok(cases)
}
