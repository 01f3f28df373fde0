//! Engine orchestration.
//!
//! `RationEngine` wires the subsystems together: requirements from the
//! animal profile, feed enrichment, the NSGA-II run, solution selection
//! and post-analysis — or the straight-through evaluation path when the
//! diet is fixed. Baby calves short-circuit to a milk schedule before any
//! feed handling.

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::evaluation::evaluate_fixed_diet;
use crate::analysis::models::DietResult;
use crate::analysis::post::run_post_analysis;
use crate::nutrition::feeds::{detect_categories, enrich_feeds};
use crate::nutrition::models::{AnimalInputs, AnimalState, FeedRow};
use crate::nutrition::requirements::calculate_requirements;
use crate::optimization::constraints::ConstraintConfig;
use crate::optimization::nsga::{run_nsga2, RunConfig};
use crate::optimization::problem::DietProblem;
use crate::optimization::selection::{select_solution, Confidence, DietStatus};
use crate::utils::{RationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mode {
    #[default]
    Recommend,
    Evaluate,
}

/// One self-contained engine request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub animal: AnimalInputs,
    pub feeds: Vec<FeedRow>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub config: RunConfig,
}

pub struct RationEngine {
    config: RunConfig,
}

impl RationEngine {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    fn constraint_config(&self) -> ConstraintConfig {
        ConstraintConfig {
            dmi_lo: self.config.dmi_lo,
            dmi_hi: self.config.dmi_hi,
            energy_offset: self.config.energy_offset,
            mp_offset: self.config.mp_offset,
        }
    }

    pub fn run(&self, request: &AssessmentRequest) -> Result<DietResult> {
        match request.mode {
            Mode::Recommend => self.recommend(&request.animal, &request.feeds),
            Mode::Evaluate => self.evaluate(&request.animal, &request.feeds),
        }
    }

    /// Least-cost recommendation for the given animal and catalog.
    pub fn recommend(&self, animal: &AnimalInputs, rows: &[FeedRow]) -> Result<DietResult> {
        let requirements = calculate_requirements(animal)?;
        info!(
            "recommend: state={} target_dmi={:.2} kg/d",
            requirements.state, requirements.target_dmi
        );

        if animal.state == AnimalState::BabyCalf {
            return Ok(milk_schedule_result(&requirements));
        }

        let feeds = enrich_feeds(rows)?;
        if feeds.is_empty() {
            return Err(RationError::InvalidInput(
                "feed catalog is empty".to_string(),
            ));
        }

        let masks = detect_categories(&feeds);
        let problem = DietProblem::new(&feeds, &requirements, masks, self.constraint_config());
        let run = run_nsga2(&problem, &self.config)?;
        let selection = select_solution(&run, &problem)?;
        Ok(run_post_analysis(&selection, &problem))
    }

    /// Evaluate a fixed diet carried on the feed rows' `quantity_as_fed`.
    pub fn evaluate(&self, animal: &AnimalInputs, rows: &[FeedRow]) -> Result<DietResult> {
        let requirements = calculate_requirements(animal)?;

        if animal.state == AnimalState::BabyCalf {
            return Ok(milk_schedule_result(&requirements));
        }

        let feeds = enrich_feeds(rows)?;
        if feeds.is_empty() {
            return Err(RationError::InvalidInput(
                "feed catalog is empty".to_string(),
            ));
        }
        evaluate_fixed_diet(&feeds, &requirements, &self.constraint_config())
    }
}

impl Default for RationEngine {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}

/// Baby calves get a milk feeding schedule; ration formulation stops here.
fn milk_schedule_result(requirements: &crate::nutrition::models::Requirements) -> DietResult {
    DietResult {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        status: DietStatus::Optimal,
        status_detail: "OPTIMAL".to_string(),
        confidence: Confidence::High,
        energy_basis: requirements.energy_basis,
        total_cost_as_fed: 0.0,
        water_intake_l_d: 0.0,
        breakdown: Vec::new(),
        proportions: Vec::new(),
        forage_subtotal: None,
        concentrate_subtotal: None,
        ration_evaluation: Vec::new(),
        nutrient_comparison: Vec::new(),
        methane: None,
        adequacy: None,
        supply: None,
        balances: None,
        requirements: requirements.clone(),
        constraint_severities: Default::default(),
        warnings: Vec::new(),
        recommendations: Vec::new(),
        messages: Vec::new(),
        cleaning_log: Vec::new(),
        milk_projection: None,
        milk_schedule: requirements.milk_schedule.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::demo_catalog;
    use crate::nutrition::models::{Breed, FeedType, Topography};

    fn lactating_inputs() -> AnimalInputs {
        AnimalInputs {
            state: AnimalState::LactatingCow,
            breed: Breed::Holstein,
            body_weight_kg: 650.0,
            body_condition_score: 3.0,
            parity: 2,
            lactation_day: 100.0,
            gestation_day: 0.0,
            target_frame_gain_kg_d: 0.2,
            target_reserve_gain_kg_d: 0.0,
            target_milk_l_d: 25.0,
            milk_true_protein_pct: 3.2,
            milk_fat_pct: 3.8,
            env_temp_c: 20.0,
            grazing: false,
            distance_km: 0.0,
            topography: Topography::Flat,
        }
    }

    fn test_engine() -> RationEngine {
        RationEngine::new(RunConfig {
            pop_size: 60,
            generations: 40,
            n_workers: 2,
            ..RunConfig::default()
        })
    }

    #[test]
    fn test_lactating_holstein_balanced_catalog() {
        let engine = test_engine();
        let result = engine
            .recommend(&lactating_inputs(), &demo_catalog())
            .unwrap();

        assert_ne!(result.status, DietStatus::Infeasible, "{}", result.status_detail);
        assert!(result.total_cost_as_fed > 0.0);

        let supply = result.supply.unwrap();
        let adequacy = result.adequacy.unwrap();
        // intake stays inside the optimizer's DMI window
        assert!(adequacy.dmi_pct > 85.0 && adequacy.dmi_pct < 110.0);
        // energy and protein land near their requirements
        assert!(adequacy.energy_pct > 85.0, "energy {:.1}%", adequacy.energy_pct);
        assert!(adequacy.protein_pct > 85.0, "protein {:.1}%", adequacy.protein_pct);
        assert!(supply.dmi > 0.0);

        let fed_ingredients = result
            .breakdown
            .iter()
            .filter(|row| row.dm_kg > 0.0)
            .count();
        assert!(fed_ingredients >= 3, "only {fed_ingredients} ingredients fed");
        assert!(result.water_intake_l_d > 0.0);
    }

    #[test]
    fn test_low_energy_catalog_reports_energy_conflict() {
        // Only poor roughages: nothing the optimizer does can reach the
        // energy requirement inside the intake cap.
        let mut rows = Vec::new();
        for (name, cp, ndf, lg) in [
            ("Rice straw", 4.0, 72.0, 7.5),
            ("Mature grass hay", 6.0, 74.0, 8.0),
        ] {
            rows.push(FeedRow {
                name: name.to_string(),
                feed_type: FeedType::Forage,
                category: "Straw/Stover".to_string(),
                price_per_kg_af: 0.04,
                dm: 90.0,
                ash: 12.0,
                cp,
                npn_cp: 0.0,
                ee: 1.3,
                cf: 0.0,
                nfe: 0.0,
                st: 0.5,
                ndf,
                hemicellulose: 0.0,
                adf: 48.0,
                cellulose: 0.0,
                lg,
                ndin: 0.15,
                adin: 0.1,
                ca: 0.25,
                p: 0.08,
                ac_ca: None,
                ac_p: None,
                quantity_as_fed: None,
            });
        }

        let engine = RationEngine::new(RunConfig {
            pop_size: 30,
            generations: 15,
            n_workers: 2,
            ..RunConfig::default()
        });
        let result = engine.recommend(&lactating_inputs(), &rows).unwrap();

        assert_eq!(result.status, DietStatus::Infeasible);
        assert!(
            result.status_detail.contains("CONFLICT:E"),
            "detail: {}",
            result.status_detail
        );
        // guidance still tells the user what to do
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.contains("high-energy concentrates")));
        // and the report structure survives
        assert_eq!(result.breakdown.len(), 2);
        assert!(!result.constraint_severities.is_empty());
    }

    #[test]
    fn test_baby_calf_short_circuits() {
        let inputs = AnimalInputs {
            state: AnimalState::BabyCalf,
            body_weight_kg: 40.0,
            parity: 0,
            target_milk_l_d: 0.0,
            ..lactating_inputs()
        };
        let engine = test_engine();
        let result = engine.recommend(&inputs, &demo_catalog()).unwrap();
        let schedule = result.milk_schedule.unwrap();
        assert_eq!(schedule.milk_total_l, 4.0);
        assert_eq!(schedule.milk_morning_l, 2.0);
        assert_eq!(schedule.milk_evening_l, 2.0);
        assert!(result.breakdown.is_empty());
    }

    #[test]
    fn test_empty_catalog_is_invalid_input() {
        let engine = test_engine();
        let err = engine.recommend(&lactating_inputs(), &[]).unwrap_err();
        assert!(matches!(err, RationError::InvalidInput(_)));
    }

    #[test]
    fn test_request_round_trip_and_run() {
        let request = AssessmentRequest {
            animal: lactating_inputs(),
            feeds: demo_catalog(),
            mode: Mode::Recommend,
            config: RunConfig {
                pop_size: 20,
                generations: 8,
                n_workers: 1,
                ..RunConfig::default()
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: AssessmentRequest = serde_json::from_str(&json).unwrap();
        let engine = RationEngine::new(parsed.config.clone());
        let result = engine.run(&parsed).unwrap();
        // any status is acceptable at this population size; output must be structured
        assert!(!result.breakdown.is_empty());
        let serialized = serde_json::to_string(&result).unwrap();
        assert!(serialized.contains("constraint_severities"));
    }
}
