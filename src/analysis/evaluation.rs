//! Fixed-diet evaluation.
//!
//! Evaluate mode skips the optimizer: the user-supplied as-fed amounts go
//! straight through the supply evaluator, the severity policy and the
//! report tables, plus a milk-support projection that names the limiting
//! nutrient and the feed cost per kg of milk.

use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::analysis::models::{Adequacy, DietResult, MilkProjection};
use crate::analysis::post::analyze_violations;
use crate::analysis::tables::{
    build_breakdown, build_proportions, methane_report, nutrient_comparison, ration_evaluation,
    water_intake,
};
use crate::nutrition::models::{EnrichedFeed, Requirements, SupplyVector};
use crate::nutrition::supply::{diet_supply, MP_FROM_CP_EFFICIENCY};
use crate::optimization::constraints::{build_constraints, ConstraintConfig};
use crate::optimization::problem::DietProblem;
use crate::optimization::selection::{Confidence, DietStatus};
use crate::optimization::severity::{evaluate_severities, OverallAssessment, StatusBand};
use crate::utils::{RationError, Result};

/// Milk production supported by the evaluated diet's energy and protein.
pub fn predict_milk_supported(
    supply: &SupplyVector,
    req: &Requirements,
    mp_maintenance_g: f64,
    diet_cost_total_af: f64,
) -> MilkProjection {
    let mp_per_kg_milk_g =
        (req.milk_true_protein_pct / 100.0) / MP_FROM_CP_EFFICIENCY * 1000.0;

    let nel_available = supply.nel - req.nel_maintenance - req.nel_gestation - req.nel_gain;
    let milk_energy_supported = if req.ne_milk_per_kg > 0.0 {
        (nel_available / req.ne_milk_per_kg).max(0.0)
    } else {
        0.0
    };

    let mp_available_g =
        supply.mp_kg * 1000.0 - (mp_maintenance_g + req.mp_growth + req.mp_pregnancy);
    let milk_protein_supported = if mp_per_kg_milk_g > 0.0 {
        (mp_available_g / mp_per_kg_milk_g).max(0.0)
    } else {
        0.0
    };

    let limiting_nutrient = if milk_energy_supported < milk_protein_supported {
        "Energy"
    } else {
        "Protein"
    };
    let milk_supported = milk_energy_supported.min(milk_protein_supported);

    let dmi_percent = if req.target_dmi > 0.0 {
        supply.dmi / req.target_dmi * 100.0
    } else {
        0.0
    };
    let dmi_status = if (95.0..=105.0).contains(&dmi_percent) {
        "Adequate"
    } else if dmi_percent < 95.0 {
        "Below target"
    } else {
        "Above target"
    };

    let feed_cost_per_kg_milk = if milk_supported > 0.0 {
        diet_cost_total_af / milk_supported
    } else {
        0.0
    };

    MilkProjection {
        milk_target_kg_d: req.milk_kg_d,
        milk_energy_supported_kg_d: milk_energy_supported,
        milk_protein_supported_kg_d: milk_protein_supported,
        milk_supported_kg_d: milk_supported,
        limiting_nutrient: limiting_nutrient.to_string(),
        nel_available_mcal: nel_available,
        mp_available_kg: mp_available_g / 1000.0,
        dmi_status: dmi_status.to_string(),
        dmi_actual: supply.dmi,
        dmi_target: req.target_dmi,
        dmi_difference: supply.dmi - req.target_dmi,
        dmi_percent,
        diet_cost_total_af,
        feed_cost_per_kg_milk,
    }
}

/// Evaluate a fixed diet: the feeds' `quantity_as_fed` fields carry the
/// ration, no optimization happens.
pub fn evaluate_fixed_diet(
    feeds: &[EnrichedFeed],
    req: &Requirements,
    constraint_cfg: &ConstraintConfig,
) -> Result<DietResult> {
    let q_dm: Vec<f64> = feeds
        .iter()
        .map(|f| f.quantity_as_fed.unwrap_or(0.0).max(0.0) * f.dm / 100.0)
        .collect();
    if q_dm.iter().sum::<f64>() < 1e-6 {
        return Err(RationError::InvalidDiet(
            "evaluation mode requires as-fed quantities on the feed rows".to_string(),
        ));
    }

    let (supply, balances, mp_maintenance_g) = diet_supply(&q_dm, feeds, req)?;

    let masks = crate::nutrition::feeds::detect_categories(feeds);
    let problem = DietProblem::new(feeds, req, masks, *constraint_cfg);
    let targets = problem.targets_with_mp(balances.mp_requirement_kg);

    let set = build_constraints(
        &q_dm,
        &supply,
        &targets,
        0.0,
        req.target_dmi,
        &problem.thr,
        &problem.masks,
        constraint_cfg,
    );
    let severities = evaluate_severities(
        &q_dm,
        &supply,
        &targets,
        req.state,
        &problem.thr,
        &problem.masks,
        &set.names,
    );
    let policy = analyze_violations(&severities, &supply, &targets, constraint_cfg.dmi_hi);

    let (breakdown, total_cost_as_fed) = build_breakdown(&q_dm, feeds);
    let tables = build_proportions(&q_dm, feeds);
    let water = water_intake(tables.dm_sum, tables.af_sum, &q_dm, feeds, req);
    let methane = methane_report(&q_dm, feeds, req);
    let evaluation_rows = ration_evaluation(&supply, &balances, req, &q_dm, feeds);
    let comparison = nutrient_comparison(&supply, &balances, req, problem.limits);

    let milk_projection = if req.state.is_lactating() {
        Some(predict_milk_supported(
            &supply,
            req,
            mp_maintenance_g,
            total_cost_as_fed,
        ))
    } else {
        None
    };

    let status = policy.recommended_status;
    let confidence = match status {
        DietStatus::Optimal | DietStatus::Good => Confidence::High,
        DietStatus::Marginal => Confidence::Medium,
        DietStatus::Infeasible => Confidence::Low,
    };
    let status_detail = OverallAssessment {
        band: match status {
            DietStatus::Optimal => StatusBand::Perfect,
            DietStatus::Good => StatusBand::Good,
            DietStatus::Marginal => StatusBand::Marginal,
            DietStatus::Infeasible => StatusBand::Infeasible,
        },
        conflict_energy: policy.conflict_energy,
        conflict_protein: policy.conflict_protein,
    };
    let status_detail = if status == DietStatus::Optimal {
        "OPTIMAL".to_string()
    } else {
        status_detail.to_string()
    };

    info!(
        "evaluated fixed diet: status={status} cost={:.2}/d",
        total_cost_as_fed
    );

    let adequacy = Adequacy {
        dmi_pct: 100.0 * supply.dmi / req.target_dmi.max(1e-9),
        energy_pct: 100.0 * supply.energy / problem.energy_target.max(1e-9),
        protein_pct: 100.0 * supply.mp_kg / balances.mp_requirement_kg.max(1e-9),
    };

    let mut result = DietResult {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        status,
        status_detail,
        confidence,
        energy_basis: req.energy_basis,
        total_cost_as_fed,
        water_intake_l_d: water,
        breakdown,
        proportions: tables.rows,
        forage_subtotal: tables.forage_subtotal,
        concentrate_subtotal: tables.concentrate_subtotal,
        ration_evaluation: evaluation_rows,
        nutrient_comparison: comparison,
        methane: Some(methane),
        adequacy: Some(adequacy),
        supply: Some(supply),
        balances: Some(balances),
        requirements: req.clone(),
        constraint_severities: severities
            .iter()
            .map(|(k, v)| (k.clone(), v.band))
            .collect(),
        warnings: policy.warnings,
        recommendations: policy.recommendations,
        messages: Vec::new(),
        cleaning_log: Vec::new(),
        milk_projection,
        milk_schedule: None,
    };
    result.sweep_non_finite();
    Ok(result)
}
