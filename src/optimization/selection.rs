//! Solution selection.
//!
//! Walks the optimizer's final population in quality order (PERFECT →
//! GOOD → MARGINAL) and picks the cheapest member of the best non-empty
//! group. When every member is infeasible it still returns the least
//! deviating one so post-analysis can explain what went wrong: selection
//! never fails on a non-empty population.

use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::optimization::nsga::{Individual, OptimizerRun};
use crate::optimization::problem::DietProblem;
use crate::optimization::severity::StatusBand;
use crate::utils::{RationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DietStatus {
    Optimal,
    Good,
    Marginal,
    Infeasible,
}

impl fmt::Display for DietStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DietStatus::Optimal => write!(f, "OPTIMAL"),
            DietStatus::Good => write!(f, "GOOD"),
            DietStatus::Marginal => write!(f, "MARGINAL"),
            DietStatus::Infeasible => write!(f, "INFEASIBLE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
    VeryLow,
}

/// The chosen diet and how much to trust it.
#[derive(Debug, Clone)]
pub struct Selection {
    pub individual: Individual,
    /// Decoded ingredient amounts, kg DM/d.
    pub quantities: Vec<f64>,
    pub status: DietStatus,
    pub confidence: Confidence,
}

/// Pick one solution from the final population.
pub fn select_solution(run: &OptimizerRun, problem: &DietProblem) -> Result<Selection> {
    if run.population.is_empty() {
        return Err(RationError::Internal(
            "optimizer returned an empty population".to_string(),
        ));
    }

    let groups = [
        (StatusBand::Perfect, DietStatus::Optimal, Confidence::High),
        (StatusBand::Good, DietStatus::Good, Confidence::High),
        (StatusBand::Marginal, DietStatus::Marginal, Confidence::Medium),
    ];

    for (band, status, confidence) in groups {
        let candidates: Vec<&Individual> = run
            .population
            .iter()
            .filter(|ind| ind.eval.flag.band == band)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        let best = candidates
            .into_iter()
            .min_by(|a, b| a.eval.cost_dm.partial_cmp(&b.eval.cost_dm).unwrap())
            .expect("non-empty candidate group");
        info!(
            "selected {status} solution, cost {:.2}/d on DM basis",
            best.eval.cost_dm
        );
        let (q, _, _) = problem.decode(&best.x);
        return Ok(Selection {
            individual: best.clone(),
            quantities: q,
            status,
            confidence,
        });
    }

    // Nothing acceptable: fall back to the least-deviating member so the
    // caller still gets structured diagnostics.
    let best = run
        .population
        .iter()
        .filter(|ind| {
            ind.eval.objectives[1].is_finite() && ind.eval.objectives[2].is_finite()
        })
        .min_by(|a, b| {
            let da = a.eval.objectives[1] + a.eval.objectives[2];
            let db = b.eval.objectives[1] + b.eval.objectives[2];
            da.partial_cmp(&db).unwrap()
        })
        .unwrap_or(&run.population[0]);
    info!("no acceptable solutions; returning least-deviating member for diagnosis");
    let (q, _, _) = problem.decode(&best.x);
    Ok(Selection {
        individual: best.clone(),
        quantities: q,
        status: DietStatus::Infeasible,
        confidence: Confidence::VeryLow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::optimization::problem::Evaluation;
    use crate::optimization::severity::OverallAssessment;

    fn individual(band: StatusBand, cost: f64, dev: f64, n: usize) -> Individual {
        let mut x = vec![1.0 / n as f64; n + 1];
        x[n] = 20.0;
        Individual {
            x,
            eval: Evaluation {
                objectives: [cost / 100.0, dev, dev],
                g: vec![0.0; 12],
                violation: 0.0,
                flag: OverallAssessment {
                    band,
                    conflict_energy: false,
                    conflict_protein: false,
                },
                severities: BTreeMap::new(),
                cost_dm: cost,
                supply: None,
            },
            rank: 0,
            crowding: 0.0,
        }
    }

    fn fake_run(members: Vec<Individual>) -> OptimizerRun {
        OptimizerRun {
            population: members,
            epsilon_history: vec![],
            generations_run: 0,
        }
    }

    // A minimal problem for decoding; selection only uses decode().
    fn make_problem<'a>(
        feeds: &'a [crate::nutrition::models::EnrichedFeed],
        req: &'a crate::nutrition::models::Requirements,
    ) -> DietProblem<'a> {
        DietProblem::new(
            feeds,
            req,
            crate::nutrition::feeds::detect_categories(feeds),
            crate::optimization::constraints::ConstraintConfig::default(),
        )
    }

    fn fixtures() -> (
        Vec<crate::nutrition::models::EnrichedFeed>,
        crate::nutrition::models::Requirements,
    ) {
        use crate::nutrition::models::{AnimalInputs, AnimalState, Breed, Topography};
        let feeds =
            crate::nutrition::feeds::enrich_feeds(&crate::data::demo_catalog()).unwrap();
        let req = crate::nutrition::requirements::calculate_requirements(&AnimalInputs {
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
        })
        .unwrap();
        (feeds, req)
    }

    #[test]
    fn test_prefers_perfect_then_cost() {
        let (feeds, req) = fixtures();
        let problem = make_problem(&feeds, &req);
        let n = feeds.len();
        let run = fake_run(vec![
            individual(StatusBand::Good, 1.0, 0.1, n),
            individual(StatusBand::Perfect, 9.0, 0.1, n),
            individual(StatusBand::Perfect, 4.0, 0.1, n),
        ]);
        let sel = select_solution(&run, &problem).unwrap();
        assert_eq!(sel.status, DietStatus::Optimal);
        assert_eq!(sel.confidence, Confidence::High);
        assert_eq!(sel.individual.eval.cost_dm, 4.0);
    }

    #[test]
    fn test_falls_through_to_marginal() {
        let (feeds, req) = fixtures();
        let problem = make_problem(&feeds, &req);
        let n = feeds.len();
        let run = fake_run(vec![
            individual(StatusBand::Infeasible, 1.0, 0.9, n),
            individual(StatusBand::Marginal, 5.0, 0.2, n),
        ]);
        let sel = select_solution(&run, &problem).unwrap();
        assert_eq!(sel.status, DietStatus::Marginal);
        assert_eq!(sel.confidence, Confidence::Medium);
    }

    #[test]
    fn test_all_infeasible_returns_least_deviating() {
        let (feeds, req) = fixtures();
        let problem = make_problem(&feeds, &req);
        let n = feeds.len();
        let run = fake_run(vec![
            individual(StatusBand::Infeasible, 1.0, 0.9, n),
            individual(StatusBand::Infeasible, 2.0, 0.3, n),
        ]);
        let sel = select_solution(&run, &problem).unwrap();
        assert_eq!(sel.status, DietStatus::Infeasible);
        assert_eq!(sel.confidence, Confidence::VeryLow);
        assert_eq!(sel.individual.eval.cost_dm, 2.0);
        assert_eq!(sel.quantities.len(), n);
    }
}
