use casetype_classifiers::artifact;
use casetype_classifiers::config::ModelConfig;
use casetype_classifiers::data_handling::{build_training_set, RawCaseRecord};
use casetype_classifiers::importance;
use casetype_classifiers::pipeline::train;
use casetype_classifiers::service::{predict, PredictionRequest};
use casetype_classifiers::synthetic::generate_cases;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() {
    env_logger::init();

    // Bootstrap-sized synthetic dataset
    let today = NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
    let cases = generate_cases(200, today, &mut StdRng::seed_from_u64(42));
    let raw: Vec<RawCaseRecord> = cases.iter().map(RawCaseRecord::from).collect();
    let set = build_training_set(&raw);
    println!("Training on {} records", set.len());

    let model = train(&set, &ModelConfig::default()).expect("training failed");

    // Round-trip through the artifact format
    let bytes = artifact::save(&model.pipeline, &model.codec).expect("save failed");
    let restored = artifact::load(&bytes).expect("load failed");
    println!("Artifact size: {} bytes", bytes.len());

    let request = PredictionRequest::new(30, "Parda", "Centro");
    let result = predict(&restored, &request).expect("prediction failed");
    println!(
        "Prediction: {}",
        serde_json::to_string_pretty(&result.rounded()).unwrap_or_default()
    );

    let importances = importance::report(&restored.pipeline).expect("importance report failed");
    for (name, value) in importances.sorted_desc().entries().iter().take(5) {
        println!("{:<24} {:.4}", name, value);
    }
}
