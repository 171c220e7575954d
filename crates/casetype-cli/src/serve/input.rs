use clap::ArgMatches;
use std::path::PathBuf;
use std::sync::Arc;

use casetype_classifiers::io::JsonFileStore;
use casetype_classifiers::service::ServiceContext;

/// Environment variable naming the artifact to serve when `--model` is absent.
pub const MODEL_ENV: &str = "CASETYPE_MODEL";
pub const DEFAULT_MODEL_PATH: &str = "model.bin";

#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    pub model_path: PathBuf,
    pub store: Option<PathBuf>,
}

impl ServeConfig {
    pub fn from_arguments(matches: &ArgMatches) -> Self {
        let model_path = resolve_model_path(
            matches.get_one::<PathBuf>("model_path"),
            std::env::var(MODEL_ENV).ok(),
        );
        let store = matches
            .try_get_one::<PathBuf>("store")
            .ok()
            .flatten()
            .cloned();
        ServeConfig { model_path, store }
    }

    /// Load the artifact; a failed load still yields a context (reporting
    /// the model as unavailable).
    pub fn context(&self) -> ServiceContext {
        let ctx = ServiceContext::load(&self.model_path);
        match &self.store {
            Some(path) => ctx.with_store(Arc::new(JsonFileStore::new(path))),
            None => ctx,
        }
    }
}

/// `--model` wins over the environment, which wins over `model.bin`.
pub fn resolve_model_path(flag: Option<&PathBuf>, env: Option<String>) -> PathBuf {
    if let Some(path) = flag {
        return path.clone();
    }
    match env {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_MODEL_PATH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_precedence() {
        let flag = PathBuf::from("flag.bin");
        assert_eq!(
            resolve_model_path(Some(&flag), Some("env.bin".into())),
            PathBuf::from("flag.bin")
        );
        assert_eq!(
            resolve_model_path(None, Some("env.bin".into())),
            PathBuf::from("env.bin")
        );
        assert_eq!(resolve_model_path(None, Some(" ".into())), PathBuf::from("model.bin"));
        assert_eq!(resolve_model_path(None, None), PathBuf::from("model.bin"));
    }
}
