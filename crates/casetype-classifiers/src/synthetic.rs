//! Random case records for bootstrapping an empty store.
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data_handling::CaseRecord;

pub const CASE_TYPES: [&str; 4] = ["Furto", "Assalto", "Violência doméstica", "Tráfico"];
pub const LOCATIONS: [&str; 4] = ["Centro", "Bairro A", "Bairro B", "Zona Rural"];
pub const ETHNICITIES: [&str; 5] = ["Branca", "Preta", "Parda", "Indígena", "Amarela"];

/// Draw `n` cases dated within the year before `today`, victims aged 1 to 90.
pub fn generate_cases<R: Rng + ?Sized>(n: usize, today: NaiveDate, rng: &mut R) -> Vec<CaseRecord> {
    (0..n)
        .map(|_| {
            let date = today - Duration::days(rng.gen_range(0..=365));
            CaseRecord::new(
                date.format("%Y-%m-%d").to_string(),
                *CASE_TYPES.choose(rng).unwrap_or(&CASE_TYPES[0]),
                *LOCATIONS.choose(rng).unwrap_or(&LOCATIONS[0]),
                *ETHNICITIES.choose(rng).unwrap_or(&ETHNICITIES[0]),
                rng.gen_range(1..=90),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::{parse_iso_date, RawCaseRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_cases_are_valid_and_reproducible() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let a = generate_cases(50, today, &mut StdRng::seed_from_u64(7));
        let b = generate_cases(50, today, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);

        for case in &a {
            assert!(CASE_TYPES.contains(&case.case_type.as_str()));
            assert!(LOCATIONS.contains(&case.location.as_str()));
            assert!(ETHNICITIES.contains(&case.victim.ethnicity.as_str()));
            assert!((1..=90).contains(&case.victim.age));
            let date = parse_iso_date(&case.case_date).unwrap();
            assert!(date <= today && date >= today - Duration::days(365));
            assert_eq!(RawCaseRecord::from(case).validate().unwrap(), *case);
        }
    }
}
