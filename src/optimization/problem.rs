//! Diet optimization problem.
//!
//! Holds the immutable per-run context (enriched feeds, requirements,
//! thresholds, masks) and evaluates one decision vector into objectives,
//! normalized constraints and a severity assessment. Evaluation never
//! fails: invalid diets are demoted to penalty values so the optimizer
//! keeps moving.

use std::collections::BTreeMap;

use log::debug;

use crate::nutrition::models::{
    CategoryMasks, EnrichedFeed, NutrientTargets, Requirements, SupplyVector,
};
use crate::nutrition::supply::diet_supply;
use crate::optimization::constants::{thresholds, StateThresholds};
use crate::optimization::constraints::{
    build_constraints, nutrient_limits, ConstraintConfig, ConstraintSet,
};
use crate::optimization::severity::{
    evaluate_severities, overall_flag, ConstraintEval, OverallAssessment, StatusBand,
};

pub const PENALTY: f64 = 1e9;

/// Outcome of evaluating one decision vector.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub objectives: [f64; 3],
    /// Normalized constraint rows padded to the problem's fixed width.
    pub g: Vec<f64>,
    /// Sum of positive normalized violations.
    pub violation: f64,
    pub flag: OverallAssessment,
    pub severities: BTreeMap<String, ConstraintEval>,
    /// Raw daily cost on a DM basis (selection orders by this).
    pub cost_dm: f64,
    pub supply: Option<SupplyVector>,
}

pub struct DietProblem<'a> {
    pub feeds: &'a [EnrichedFeed],
    pub requirements: &'a Requirements,
    pub thr: StateThresholds,
    pub masks: CategoryMasks,
    pub constraint_cfg: ConstraintConfig,
    pub energy_target: f64,
    pub limits: (f64, f64, f64, f64),
    pub cost_scale: f64,
    pub n_constraints: usize,
}

impl<'a> DietProblem<'a> {
    pub fn new(
        feeds: &'a [EnrichedFeed],
        requirements: &'a Requirements,
        masks: CategoryMasks,
        constraint_cfg: ConstraintConfig,
    ) -> Self {
        let thr = thresholds(requirements.state);
        let energy_target = if requirements.state.is_heifer() {
            requirements.me_total
        } else {
            requirements.nel_total
        };
        let limits = nutrient_limits(&thr, requirements.target_dmi);

        let mean_cost = if feeds.is_empty() {
            0.0
        } else {
            feeds.iter().map(|f| f.cost_per_dm_kg).sum::<f64>() / feeds.len() as f64
        };
        let cost_scale = (mean_cost * requirements.target_dmi).max(1e-3);

        let conditional = [
            masks.has_straw(),
            masks.has_moist_forage(),
            masks.has_lqf(),
            masks.has_wet_byprod(),
            masks.has_wet_other(),
            masks.has_concentrate(),
        ]
        .iter()
        .filter(|&&b| b)
        .count();
        let n_constraints = 12 + conditional;

        Self {
            feeds,
            requirements,
            thr,
            masks,
            constraint_cfg,
            energy_target,
            limits,
            cost_scale,
            n_constraints,
        }
    }

    pub fn n_vars(&self) -> usize {
        self.feeds.len() + 1
    }

    /// Decode a decision vector into (kg/d amounts, proportions, intake).
    pub fn decode(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, f64) {
        let n = self.feeds.len();
        let mut p: Vec<f64> = x[..n].iter().map(|&v| v.max(0.0)).collect();
        let s: f64 = p.iter().sum();
        if s <= 0.0 {
            p = vec![1.0 / n as f64; n];
        } else {
            for v in &mut p {
                *v /= s;
            }
        }
        let t = x[n];
        let q: Vec<f64> = p.iter().map(|&v| v * t).collect();
        (q, p, t)
    }

    fn penalty_evaluation(&self) -> Evaluation {
        Evaluation {
            objectives: [PENALTY; 3],
            g: vec![PENALTY; self.n_constraints],
            violation: PENALTY,
            flag: OverallAssessment {
                band: StatusBand::Infeasible,
                conflict_energy: false,
                conflict_protein: false,
            },
            severities: BTreeMap::new(),
            cost_dm: PENALTY,
            supply: None,
        }
    }

    /// Evaluate one decision vector at the given constraint relaxation.
    pub fn evaluate(&self, x: &[f64], epsilon: f64) -> Evaluation {
        let (q, _p, _t) = self.decode(x);

        let (supply, balances, _mpm) =
            match diet_supply(&q, self.feeds, self.requirements) {
                Ok(v) => v,
                Err(e) => {
                    debug!("evaluation demoted to penalty: {e}");
                    return self.penalty_evaluation();
                }
            };

        let req = self.requirements;
        let targets = NutrientTargets {
            dmi: req.target_dmi,
            energy: self.energy_target,
            mp_kg: balances.mp_requirement_kg,
            ca_kg: req.ca_req_kg,
            p_kg: req.p_req_kg,
            ndf_max_kg: self.limits.0,
            ndf_forage_min_kg: self.limits.1,
            starch_max_kg: self.limits.2,
            ee_max_kg: self.limits.3,
        };

        let set: ConstraintSet = build_constraints(
            &q,
            &supply,
            &targets,
            epsilon,
            req.target_dmi,
            &self.thr,
            &self.masks,
            &self.constraint_cfg,
        );

        let mut g = set.normalized();
        let violation = g.iter().filter(|&&v| v > 0.0).sum();
        g.resize(self.n_constraints, 0.0);

        let severities = evaluate_severities(
            &q,
            &supply,
            &targets,
            req.state,
            &self.thr,
            &self.masks,
            &set.names,
        );
        let flag = overall_flag(
            &severities,
            &supply,
            &targets,
            epsilon,
            self.constraint_cfg.dmi_hi,
        );

        let cost_dm: f64 = q
            .iter()
            .zip(self.feeds)
            .map(|(amt, f)| amt * f.cost_per_dm_kg)
            .sum();

        let f1 = cost_dm / self.cost_scale * 0.1;
        let f2 = (req.target_dmi - supply.dmi).abs() / req.target_dmi.max(1e-3);
        let dev_energy =
            (supply.energy - self.energy_target).abs() / self.energy_target.max(1e-3);
        let dev_mp = (supply.mp_kg - balances.mp_requirement_kg).abs()
            / balances.mp_requirement_kg.max(1e-3);
        let f3 = dev_energy + dev_mp;

        Evaluation {
            objectives: [f1, f2, f3],
            g,
            violation,
            flag,
            severities,
            cost_dm,
            supply: Some(supply),
        }
    }

    /// Per-evaluation nutrient targets for a fixed MP requirement (used by
    /// post-analysis where the supply has already been computed).
    pub fn targets_with_mp(&self, mp_requirement_kg: f64) -> NutrientTargets {
        let req = self.requirements;
        NutrientTargets {
            dmi: req.target_dmi,
            energy: self.energy_target,
            mp_kg: mp_requirement_kg,
            ca_kg: req.ca_req_kg,
            p_kg: req.p_req_kg,
            ndf_max_kg: self.limits.0,
            ndf_forage_min_kg: self.limits.1,
            starch_max_kg: self.limits.2,
            ee_max_kg: self.limits.3,
        }
    }
}
