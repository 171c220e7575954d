//! Command-line adapters over the transport-agnostic service handlers.
use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use casetype_classifiers::data_handling::{AGE_COLUMN, ETHNICITY_COLUMN, LOCATION_COLUMN};
use casetype_classifiers::service::{
    handle_health, handle_importances, handle_predict, PredictionRequest, PredictionResult, Reply,
    ServiceContext,
};

/// Read a request body (one object, or an array of objects for a batch).
pub fn read_request_body<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request file: {}", path.display()))
}

/// Build a request body from the `--idade`, `--etnia` and `--localizacao`
/// flags. Absent flags stay absent so the service reports them as missing.
pub fn request_from_flags(matches: &ArgMatches) -> Value {
    let mut body = Map::new();
    if let Some(age) = matches.get_one::<u32>("idade") {
        body.insert(AGE_COLUMN.to_string(), json!(age));
    }
    if let Some(ethnicity) = matches.get_one::<String>("etnia") {
        body.insert(ETHNICITY_COLUMN.to_string(), json!(ethnicity));
    }
    if let Some(location) = matches.get_one::<String>("localizacao") {
        body.insert(LOCATION_COLUMN.to_string(), json!(location));
    }
    Value::Object(body)
}

pub fn run_predict(ctx: &ServiceContext, body: &Value) -> Result<Value> {
    match body {
        Value::Array(items) => {
            let requests = items
                .iter()
                .map(|item| serde_json::from_value::<PredictionRequest>(item.clone()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Invalid request in batch")?;
            let results: Vec<PredictionResult> = ctx
                .predict_batch(&requests)?
                .iter()
                .map(PredictionResult::rounded)
                .collect();
            Ok(json!(results))
        }
        _ => into_result(handle_predict(ctx, body)),
    }
}

pub fn run_importances(ctx: &ServiceContext) -> Result<Value> {
    into_result(handle_importances(ctx))
}

pub fn run_health(ctx: &ServiceContext) -> Value {
    handle_health(ctx).body
}

fn into_result(reply: Reply) -> Result<Value> {
    if reply.status == 200 {
        return Ok(reply.body);
    }
    let message = reply.body["error"]
        .as_str()
        .unwrap_or("unknown error")
        .to_string();
    bail!("{} (status {})", message, reply.status)
}
