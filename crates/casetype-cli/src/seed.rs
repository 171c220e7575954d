use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

use casetype_classifiers::data_handling::CaseRecord;
use casetype_classifiers::io::{CaseStore, JsonFileStore};
use casetype_classifiers::synthetic::generate_cases;

use crate::util::{display_or_stdout, print_json};

/// Generate `count` synthetic cases dated up to today. With `output` the
/// cases are appended to that JSON store, otherwise printed to stdout.
pub fn run_seed(count: usize, seed: Option<u64>, output: Option<&Path>) -> Result<Vec<CaseRecord>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let cases = generate_cases(count, Local::now().date_naive(), &mut rng);

    match output {
        Some(path) => JsonFileStore::new(path)
            .insert_cases(&cases)
            .with_context(|| format!("Failed to store cases in {}", path.display()))?,
        None => print_json(&cases)?,
    }
    info!("Generated {} cases into {}", cases.len(), display_or_stdout(output));
    Ok(cases)
}
