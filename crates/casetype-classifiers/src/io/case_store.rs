//! Case record storage boundary plus JSON and CSV readers.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use serde_json::Value;

use crate::data_handling::{
    CaseRecord, RawCaseRecord, RawVictim, AGE_COLUMN, CASE_DATE_COLUMN, CASE_TYPE_COLUMN,
    ETHNICITY_COLUMN, LOCATION_COLUMN,
};

/// Bulk access to stored case records.
pub trait CaseStore {
    /// Every stored record, in storage order.
    fn list_cases(&self) -> Result<Vec<RawCaseRecord>>;

    fn insert_cases(&self, cases: &[CaseRecord]) -> Result<()>;

    /// Remove the first record dated `case_date`. Returns whether one was found.
    fn delete_case(&self, case_date: &str) -> Result<bool>;

    /// First record whose `data_do_caso` equals `case_date` verbatim.
    fn find_case(&self, case_date: &str) -> Result<Option<RawCaseRecord>> {
        Ok(self
            .list_cases()?
            .into_iter()
            .find(|case| has_date(case, case_date)))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.list_cases()?.len())
    }
}

fn has_date(case: &RawCaseRecord, case_date: &str) -> bool {
    case.data_do_caso.as_ref().and_then(Value::as_str) == Some(case_date)
}

/// Case records kept as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaseStore for JsonFileStore {
    fn list_cases(&self) -> Result<Vec<RawCaseRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_cases_json(&self.path)
    }

    fn insert_cases(&self, cases: &[CaseRecord]) -> Result<()> {
        let mut all = self.list_cases()?;
        all.extend(cases.iter().map(RawCaseRecord::from));
        write_cases_json(&self.path, &all)?;
        info!("Inserted {} cases into {}", cases.len(), self.path.display());
        Ok(())
    }

    fn delete_case(&self, case_date: &str) -> Result<bool> {
        let mut all = self.list_cases()?;
        match all.iter().position(|case| has_date(case, case_date)) {
            Some(idx) => {
                all.remove(idx);
                write_cases_json(&self.path, &all)?;
                info!("Deleted case dated {} from {}", case_date, self.path.display());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Read records from a `.json` array or a `.csv` file, chosen by extension.
pub fn read_cases<P: AsRef<Path>>(path: P) -> Result<Vec<RawCaseRecord>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("json") => read_cases_json(path),
        Some("csv") => read_cases_csv(path),
        _ => bail!("Case file must have a .json or .csv extension: {}", path.display()),
    }
}

pub fn read_cases_json<P: AsRef<Path>>(path: P) -> Result<Vec<RawCaseRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read case file: {}", path.display()))?;
    let cases: Vec<RawCaseRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse case file: {}", path.display()))?;
    debug!("Read {} cases from {}", cases.len(), path.display());
    Ok(cases)
}

/// Write records as a pretty JSON array, replacing the file atomically.
pub fn write_cases_json<P: AsRef<Path>>(path: P, cases: &[RawCaseRecord]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, cases)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e.error))?;
    Ok(())
}

/// Read flat CSV rows with columns `data_do_caso`, `tipo_do_caso`,
/// `localizacao`, `etnia` and `idade`. Empty cells are treated as missing.
pub fn read_cases_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawCaseRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open case file: {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV header row")?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let date_idx = column(CASE_DATE_COLUMN);
    let type_idx = column(CASE_TYPE_COLUMN);
    let location_idx = column(LOCATION_COLUMN);
    let ethnicity_idx = column(ETHNICITY_COLUMN);
    let age_idx = column(AGE_COLUMN);
    if [type_idx, location_idx, ethnicity_idx, age_idx]
        .iter()
        .all(Option::is_none)
    {
        bail!("CSV file {} has none of the expected case columns", path.display());
    }

    let mut cases = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", line + 2))?;
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        cases.push(RawCaseRecord {
            data_do_caso: cell(date_idx).map(Value::from),
            tipo_do_caso: cell(type_idx).map(Value::from),
            localizacao: cell(location_idx).map(Value::from),
            vitima: Some(RawVictim {
                etnia: cell(ethnicity_idx).map(Value::from),
                idade: cell(age_idx).map(|s| parse_number_cell(&s)),
            }),
        });
    }
    debug!("Read {} cases from {}", cases.len(), path.display());
    Ok(cases)
}

/// Numbers become JSON numbers; anything else stays a string and fails validation later.
fn parse_number_cell(cell: &str) -> Value {
    if let Ok(v) = cell.parse::<i64>() {
        return Value::from(v);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Value::from(v),
        _ => Value::from(cell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::build_training_set;

    #[test]
    fn csv_rows_become_raw_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.csv");
        fs::write(
            &path,
            "data_do_caso,tipo_do_caso,localizacao,etnia,idade\n\
             2024-01-02,Furto,Centro,Parda,33\n\
             2024-01-03,Assalto,,Preta,41\n\
             2024-01-04,Tráfico,Bairro B,Branca,abc\n",
        )
        .unwrap();

        let cases = read_cases(&path).unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(
            cases[0].validate().unwrap(),
            CaseRecord::new("2024-01-02", "Furto", "Centro", "Parda", 33)
        );
        assert!(cases[1].localizacao.is_none());

        let set = build_training_set(&cases);
        assert_eq!(set.len(), 1);
        assert_eq!(set.dropped, 2);
    }

    #[test]
    fn json_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("db").join("cases.json"));
        assert_eq!(store.count().unwrap(), 0);

        let first = CaseRecord::new("2024-02-01", "Furto", "Centro", "Amarela", 20);
        let second = CaseRecord::new("2024-02-02", "Assalto", "Bairro A", "Preta", 70);
        store.insert_cases(&[first.clone()]).unwrap();
        store.insert_cases(&[second.clone()]).unwrap();

        let cases = store.list_cases().unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].validate().unwrap(), first);
        assert_eq!(cases[1].validate().unwrap(), second);
    }

    #[test]
    fn json_store_finds_and_deletes_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cases.json"));
        store
            .insert_cases(&[
                CaseRecord::new("2024-03-01", "Furto", "Centro", "Parda", 30),
                CaseRecord::new("2024-03-02", "Assalto", "Bairro A", "Preta", 40),
                CaseRecord::new("2024-03-01", "Tráfico", "Zona Rural", "Branca", 50),
            ])
            .unwrap();

        let found = store.find_case("2024-03-01").unwrap().unwrap();
        assert_eq!(found.validate().unwrap().case_type, "Furto");
        assert!(store.find_case("1999-01-01").unwrap().is_none());

        assert!(store.delete_case("2024-03-01").unwrap());
        assert_eq!(store.count().unwrap(), 2);
        let found = store.find_case("2024-03-01").unwrap().unwrap();
        assert_eq!(found.validate().unwrap().case_type, "Tráfico");
        assert!(!store.delete_case("1999-01-01").unwrap());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        assert!(read_cases("cases.parquet").is_err());
    }
}
