//! Post-optimization analysis.
//!
//! Cleans the chosen solution, recomputes its supply, classifies the
//! remaining violations, derives the reported status, and assembles the
//! externally visible `DietResult` with direction-aware guidance.

use std::collections::BTreeMap;

use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::analysis::models::{
    Adequacy, DietResult, Message, MessageLevel,
};
use crate::analysis::tables::{
    build_breakdown, build_proportions, methane_report, nutrient_comparison, ration_evaluation,
    water_intake,
};
use crate::nutrition::models::{CategoryMasks, EnrichedFeed, NutrientTargets, SupplyVector};
use crate::nutrition::supply::diet_supply;
use crate::optimization::constants::{
    count_rule, tolerance_key, CRITICAL_KEYS, MAX_ACTIONS, MAX_CRITICAL_LINES,
};
use crate::optimization::constraints::build_constraints;
use crate::optimization::problem::DietProblem;
use crate::optimization::selection::{Confidence, DietStatus, Selection};
use crate::optimization::severity::{
    detect_conflicts, evaluate_severities, ConstraintEval, Direction, OverallAssessment,
    SeverityBand, StatusBand,
};

/// Amounts below these thresholds are zeroed out of the final ration.
pub const CLEAN_THRESHOLD_FORAGE_CONC_KG: f64 = 0.1;
pub const CLEAN_THRESHOLD_MINERAL_KG: f64 = 0.005;

fn is_mineral_class(feed: &EnrichedFeed) -> bool {
    let name = feed.name.to_lowercase();
    feed.is_mineral
        || feed.category.trim() == "Additive"
        || matches!(feed.feed_type, crate::nutrition::models::FeedType::Additive)
        || name.contains("urea")
        || name.contains("premix")
}

/// Zero negligible amounts; report what got dropped.
pub fn clean_solution(
    q: &[f64],
    feeds: &[EnrichedFeed],
) -> (Vec<f64>, Vec<Message>, Vec<String>) {
    let mut cleaned = q.to_vec();
    let mut messages = Vec::new();
    let mut log = Vec::new();

    for (i, amount) in cleaned.iter_mut().enumerate() {
        let feed = &feeds[i];
        if !amount.is_finite() || *amount < 0.0 {
            messages.push(
                Message::new(
                    MessageLevel::Warn,
                    "RFT-CLN-001",
                    "clean_solution",
                    format!("invalid amount for {} set to 0", feed.name),
                )
                .with_detail(format!("amount={amount}")),
            );
            *amount = 0.0;
            continue;
        }
        let (threshold, label) = if is_mineral_class(feed) {
            (CLEAN_THRESHOLD_MINERAL_KG, "Mineral/Additive")
        } else {
            (CLEAN_THRESHOLD_FORAGE_CONC_KG, "Forage/Concentrate")
        };
        if *amount > 0.0 && *amount < threshold {
            log.push(format!("{} ({label}) {:.3} → 0.000", feed.name, amount));
            *amount = 0.0;
        }
    }
    (cleaned, messages, log)
}

// ======================================================================
// VIOLATION POLICY
// ======================================================================

#[derive(Debug, Clone)]
pub struct ViolationPolicy {
    pub recommended_status: DietStatus,
    pub conflict_energy: bool,
    pub conflict_protein: bool,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub marginal_count: usize,
    pub infeasible_count: usize,
}

/// Worst classified finding per tolerance key (a key can back both a
/// `_min` and a `_max` constraint; the violated side wins).
fn fold_by_key(severities: &BTreeMap<String, ConstraintEval>) -> BTreeMap<&'static str, ConstraintEval> {
    let mut by_key: BTreeMap<&'static str, ConstraintEval> = BTreeMap::new();
    let key_of = |canonical: &str| -> Option<&'static str> {
        let built = match canonical {
            "dmi_max" => "DMI_max",
            "dmi_min" => "DMI_min",
            "energy_max" => "Energy_max",
            "energy_min" => "Energy_min",
            "protein_max" => "MP_max",
            "protein_min" => "MP_min",
            "ca_min" => "Ca_min",
            "p_min" => "P_min",
            "ndf_max" => "NDF_max",
            "ndf_for_min" => "NDFfor_min",
            "starch_max" => "Starch_max",
            "fat_max" => "EE_max",
            "forage_straw_max" => "Straw_max",
            "moist_forage_min" => "MoistForage_min",
            "forage_fibrous_max" => "LQF_max",
            "conc_byprod_max" => "Byprod_max",
            "other_wet_ingr_max" => "WetOther_max",
            "conc_max" => "Conc_max",
            _ => return None,
        };
        tolerance_key(built)
    };
    for (name, eval) in severities {
        if let Some(key) = key_of(name) {
            let entry = by_key.entry(key).or_insert(*eval);
            if eval.band > entry.band {
                *entry = *eval;
            }
        }
    }
    by_key
}

fn action_templates(key: &str, direction: Direction) -> Vec<String> {
    let items: &[&str] = match (key, direction) {
        ("dmi", Direction::Under) => {
            &["Swap to more digestible forages; reduce straw/low-quality fibrous forages."]
        }
        ("dmi", Direction::Over) => {
            &["Increase nutrient density: replace some forage with concentrates."]
        }
        ("energy", Direction::Under) => &["Add high-energy concentrates (e.g., corn/barley)."],
        ("energy", Direction::Over) => {
            &["Reduce cereal grains; or add fibrous by-products/forage."]
        }
        ("protein", Direction::Under) => &["Add true-protein meals (e.g., soybean meal)."],
        ("protein", Direction::Over) => {
            &["Trim protein supplements; replace with energy sources."]
        }
        ("ca", Direction::Under) | ("p", Direction::Under) => &["Increase mineral premix."],
        ("ndf_for", Direction::Under) => &["Add forage ingredients (hay/silage)."],
        ("ndf", Direction::Over) => &[
            "Dilute fiber: reduce straw/low-quality fibrous forages; replace with higher-energy forage or concentrates.",
        ],
        ("starch", Direction::Over) => {
            &["Cut cereal grains; use digestible fiber sources to dilute starch."]
        }
        ("fat", Direction::Over) => {
            &["Reduce high-fat ingredients (oils/whole oilseeds/bypass fat)."]
        }
        ("conc_max", Direction::Over) => {
            &["Lower total concentrates; replace with high-quality forage."]
        }
        ("conc_byprod_max", Direction::Over) => {
            &["Reduce wet by-products; shift to dry concentrates or forage."]
        }
        ("other_wet_ingr_max", Direction::Over) => {
            &["Reduce wet non-forage ingredients; replace with dry concentrates/forage."]
        }
        ("forage_straw_max", Direction::Over) => {
            &["Cut straw; use moderate-NDF forage for structure instead."]
        }
        ("forage_fibrous_max", Direction::Over) => {
            &["Replace low-quality fibrous forage with higher-quality forage."]
        }
        ("moist_forage_min", Direction::Under) => &["Add moist forages (e.g., silage/pasture)."],
        ("urea_max", Direction::Over) => {
            &["Reduce urea/NPN; supply true protein sources instead."]
        }
        _ => &[],
    };
    items.iter().map(|s| s.to_string()).collect()
}

fn is_violated_over(evals: &BTreeMap<&'static str, ConstraintEval>, key: &str) -> bool {
    evals.get(key).is_some_and(|e| {
        matches!(e.band, SeverityBand::Marginal | SeverityBand::Infeasible)
            && e.direction == Direction::Over
    })
}

/// Derive the reported status and the user-facing guidance lists.
pub fn analyze_violations(
    severities: &BTreeMap<String, ConstraintEval>,
    supply: &SupplyVector,
    targets: &NutrientTargets,
    dmi_hi: f64,
) -> ViolationPolicy {
    let by_key = fold_by_key(severities);
    let (conflict_energy, conflict_protein) = detect_conflicts(supply, targets, 0.0, dmi_hi);

    // Counted tallies: only findings whose direction the count rules say
    // matter contribute toward failure.
    let mut counted_marginal = 0usize;
    let mut counted_infeasible = 0usize;
    let mut counted_critical_infeasible = 0usize;
    let mut counted_safety = 0usize;

    for (key, eval) in &by_key {
        let rule = count_rule(key);
        let counts = match (eval.band, eval.direction) {
            (SeverityBand::Marginal, Direction::Under) => rule.marginal_under,
            (SeverityBand::Marginal, Direction::Over) => rule.marginal_over,
            (SeverityBand::Infeasible, Direction::Under) => rule.infeasible_under,
            (SeverityBand::Infeasible, Direction::Over) => rule.infeasible_over,
            _ => false,
        };
        if !counts {
            continue;
        }
        match eval.band {
            SeverityBand::Marginal => {
                counted_marginal += 1;
                if *key == "dmi" {
                    counted_safety += 1;
                }
            }
            SeverityBand::Infeasible => {
                counted_infeasible += 1;
                if matches!(*key, "dmi" | "energy" | "protein") {
                    counted_critical_infeasible += 1;
                    counted_safety += 1;
                }
            }
            _ => {}
        }
    }

    let recommended_status = if conflict_energy || conflict_protein {
        DietStatus::Infeasible
    } else if counted_critical_infeasible > 0
        || counted_safety > 1
        || counted_infeasible > 1
        || counted_marginal + counted_infeasible >= 4
    {
        DietStatus::Infeasible
    } else {
        let total = by_key.len();
        let perfect = by_key
            .values()
            .filter(|e| e.band == SeverityBand::Perfect)
            .count();
        let good = by_key
            .values()
            .filter(|e| e.band == SeverityBand::Good)
            .count();
        if total == 0 {
            DietStatus::Marginal
        } else if perfect as f64 >= total as f64 * 0.85 {
            DietStatus::Optimal
        } else if (perfect + good) as f64 >= total as f64 * 0.75 {
            DietStatus::Good
        } else {
            DietStatus::Marginal
        }
    };

    // Warnings: critical constraints first, worst deviation first.
    let mut critical: Vec<(&str, &ConstraintEval)> = by_key
        .iter()
        .filter(|(key, eval)| {
            CRITICAL_KEYS.contains(key)
                && matches!(eval.band, SeverityBand::Marginal | SeverityBand::Infeasible)
        })
        .map(|(k, v)| (*k, v))
        .collect();
    critical.sort_by(|a, b| {
        b.1.raw_deviation
            .abs()
            .partial_cmp(&a.1.raw_deviation.abs())
            .unwrap()
    });

    let mut warnings: Vec<String> = Vec::new();
    if conflict_energy {
        warnings.push(
            "Feed catalog energy density is too low to meet the energy requirement within the intake cap."
                .to_string(),
        );
    }
    if conflict_protein {
        warnings.push(
            "Feed catalog protein density is too low to meet the protein requirement within the intake cap."
                .to_string(),
        );
    }
    for (key, eval) in critical.iter().take(MAX_CRITICAL_LINES) {
        let side = match eval.direction {
            Direction::Under => "below",
            Direction::Over => "above",
            Direction::Within => continue,
        };
        let label = match *key {
            "dmi" => "Intake",
            "energy" => "Energy supply",
            "protein" => "Protein supply",
            "ndf_for" => "Forage fiber",
            other => other,
        };
        warnings.push(format!(
            "{label} {:.1}% {side} requirement ({})",
            eval.raw_deviation.abs(),
            eval.band
        ));
    }

    // Recommendations: direction-aware templates with context overrides.
    let conc_over = is_violated_over(&by_key, "conc_max");
    let energy_over = is_violated_over(&by_key, "energy");
    let mut actions: Vec<String> = Vec::new();
    for (key, eval) in &by_key {
        if !matches!(eval.band, SeverityBand::Marginal | SeverityBand::Infeasible) {
            continue;
        }
        let mut items = action_templates(key, eval.direction);

        if *key == "dmi" && eval.direction == Direction::Under && conc_over {
            items = vec![
                "Raise forage energy density (corn silage/high-digestibility forage).".to_string(),
                "Free space for forage: trim cereal grains; add long-fiber forage to restore structure."
                    .to_string(),
                "Maintain energy with fibrous by-products, not more grain.".to_string(),
            ];
        }
        if *key == "protein" && eval.direction == Direction::Over && energy_over {
            items = items
                .into_iter()
                .map(|s| {
                    s.replace(
                        "replace with energy sources",
                        "replace with forage or fibrous by-products",
                    )
                })
                .collect();
        }
        if *key == "energy" && eval.direction == Direction::Under && conc_over {
            items = vec![
                "Prefer higher-NEL forage (corn silage) over adding more concentrates.".to_string(),
            ];
        }
        actions.extend(items);
    }

    // Cross-constraint conflict resolution and dedup
    let mut resolved: Vec<String> = Vec::new();
    for action in actions {
        if conc_over && action.contains("Add high-energy concentrates") {
            continue;
        }
        if energy_over && action.contains("replace with energy sources") {
            continue;
        }
        let action = action.replace("Reduce cereal grains; or", "Reduce cereal grains;");
        if !resolved.contains(&action) {
            resolved.push(action);
        }
    }
    resolved.truncate(MAX_ACTIONS);

    ViolationPolicy {
        recommended_status,
        conflict_energy,
        conflict_protein,
        warnings,
        recommendations: resolved,
        marginal_count: counted_marginal,
        infeasible_count: counted_infeasible,
    }
}

// ======================================================================
// RESULT ASSEMBLY
// ======================================================================

fn confidence_for(status: DietStatus) -> Confidence {
    match status {
        DietStatus::Optimal | DietStatus::Good => Confidence::High,
        DietStatus::Marginal => Confidence::Medium,
        DietStatus::Infeasible => Confidence::Low,
    }
}

/// Full post-analysis of a selected solution into the final `DietResult`.
pub fn run_post_analysis(selection: &Selection, problem: &DietProblem) -> DietResult {
    let feeds = problem.feeds;
    let req = problem.requirements;
    let mut messages: Vec<Message> = Vec::new();

    let (q, clean_messages, cleaning_log) = clean_solution(&selection.quantities, feeds);
    messages.extend(clean_messages);
    for entry in &cleaning_log {
        info!("cleanup: {entry}");
    }

    let supply_result = diet_supply(&q, feeds, req);
    let (supply, balances, _mpm) = match supply_result {
        Ok(v) => v,
        Err(e) => {
            warn!("post-analysis failed to recompute the cleaned diet: {e}");
            messages.push(
                Message::new(
                    MessageLevel::Blocker,
                    "RFT-ANL-001",
                    "diet_supply",
                    "failed to recalculate the diet after cleaning",
                )
                .with_detail(e.to_string())
                .with_hint("check feed library rows and units"),
            );
            let mut result = empty_result(
                DietStatus::Infeasible,
                Confidence::VeryLow,
                problem,
                messages,
                cleaning_log,
            );
            result.sweep_non_finite();
            return result;
        }
    };

    let targets = problem.targets_with_mp(balances.mp_requirement_kg);
    let set = build_constraints(
        &q,
        &supply,
        &targets,
        0.0,
        req.target_dmi,
        &problem.thr,
        &problem.masks,
        &problem.constraint_cfg,
    );
    let severities = evaluate_severities(
        &q,
        &supply,
        &targets,
        req.state,
        &problem.thr,
        &problem.masks,
        &set.names,
    );
    let policy = analyze_violations(&severities, &supply, &targets, problem.constraint_cfg.dmi_hi);

    // The selector's verdict floors the final status: a solution picked
    // from the infeasible fallback never reports better than INFEASIBLE.
    let (status, confidence) = if selection.status == DietStatus::Infeasible {
        (DietStatus::Infeasible, Confidence::VeryLow)
    } else {
        (
            policy.recommended_status,
            confidence_for(policy.recommended_status),
        )
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

    let (breakdown, total_cost_as_fed) = build_breakdown(&q, feeds);
    let tables = build_proportions(&q, feeds);
    let water = water_intake(tables.dm_sum, tables.af_sum, &q, feeds, req);
    let methane = methane_report(&q, feeds, req);
    let evaluation_rows = ration_evaluation(&supply, &balances, req, &q, feeds);
    let comparison = nutrient_comparison(&supply, &balances, req, problem.limits);

    let energy_req = problem.energy_target;
    let adequacy = Adequacy {
        dmi_pct: 100.0 * supply.dmi / req.target_dmi.max(1e-9),
        energy_pct: 100.0 * supply.energy / energy_req.max(1e-9),
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
        messages,
        cleaning_log,
        milk_projection: None,
        milk_schedule: None,
    };
    result.sweep_non_finite();
    result
}

/// Structured result for paths where no diet can be analyzed.
pub fn empty_result(
    status: DietStatus,
    confidence: Confidence,
    problem: &DietProblem,
    messages: Vec<Message>,
    cleaning_log: Vec<String>,
) -> DietResult {
    DietResult {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        status,
        status_detail: status.to_string(),
        confidence,
        energy_basis: problem.requirements.energy_basis,
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
        requirements: problem.requirements.clone(),
        constraint_severities: BTreeMap::new(),
        warnings: Vec::new(),
        recommendations: Vec::new(),
        messages,
        cleaning_log,
        milk_projection: None,
        milk_schedule: None,
    }
}

/// Convenience used by tests and the evaluation path.
pub fn masks_for(feeds: &[EnrichedFeed]) -> CategoryMasks {
    crate::nutrition::feeds::detect_categories(feeds)
}
