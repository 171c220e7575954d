//! IO utilities for loading and storing case records.

pub mod case_store;

pub use case_store::{
    read_cases, read_cases_csv, read_cases_json, write_cases_json, CaseStore, JsonFileStore,
};
