pub mod catalog;

use crate::logic::SimulationPlan;
use catalog::catalog_scenarios;

/// Named headless scenario with the plan it runs.
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub key: &'static str,
    pub name: String,
    pub description: &'static str,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn new(
        key: &'static str,
        name: impl Into<String>,
        description: &'static str,
        plan: SimulationPlan,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            description,
            plan,
        }
    }
}

/// Look a scenario up by its CLI key, ignoring case.
pub fn get_scenario(key: &str) -> Option<TestScenario> {
    catalog_scenarios()
        .into_iter()
        .find(|scenario| scenario.key.eq_ignore_ascii_case(key))
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_scenarios()
        .into_iter()
        .map(|scenario| (scenario.key, scenario.description))
        .collect()
}

/// Every scenario key in catalog order.
pub fn all_scenario_keys() -> Vec<String> {
    catalog_scenarios()
        .into_iter()
        .map(|scenario| scenario.key.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let scenario = get_scenario("Bootstrap-Dispatch").unwrap();
        assert_eq!(scenario.key, "bootstrap-dispatch");
        assert!(get_scenario("no-such-scenario").is_none());
    }

    #[test]
    fn listing_matches_keys() {
        let listed: Vec<_> = list_scenarios().into_iter().map(|(key, _)| key).collect();
        assert_eq!(listed, all_scenario_keys());
        assert!(listed.contains(&"determinism"));
    }
}
