//! Constraint construction.
//!
//! Builds the ordered inequality list `G ≤ 0` for one candidate diet:
//! twelve always-on nutritional constraints plus the ingredient-class
//! constraints that only exist when the catalog actually contains that
//! class. Every row carries a scale (the absolute magnitude of its limit)
//! so the optimizer can normalize violations.

use crate::nutrition::models::{CategoryMasks, NutrientTargets, SupplyVector};
use crate::optimization::constants::StateThresholds;

/// Relaxation/offset knobs for the constraint envelope.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintConfig {
    pub dmi_lo: f64,
    pub dmi_hi: f64,
    /// Mcal allowance added to the energy target before the 120% cap.
    pub energy_offset: f64,
    /// kg MP allowance added before the 120% cap.
    pub mp_offset: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            dmi_lo: 0.90,
            dmi_hi: 1.05,
            energy_offset: 1.0,
            mp_offset: 0.10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintSet {
    pub g: Vec<f64>,
    pub scales: Vec<f64>,
    pub names: Vec<&'static str>,
}

impl ConstraintSet {
    fn push(&mut self, name: &'static str, g: f64, scale: f64) {
        self.names.push(name);
        self.g.push(g);
        self.scales.push(scale);
    }

    /// Violations normalized by their limit scale (clamped at 1e-3).
    pub fn normalized(&self) -> Vec<f64> {
        self.g
            .iter()
            .zip(&self.scales)
            .map(|(g, s)| g / s.abs().max(1e-3))
            .collect()
    }

    /// Sum of positive (violated) normalized rows.
    pub fn violation_sum(&self) -> f64 {
        self.normalized().iter().filter(|&&v| v > 0.0).sum()
    }
}

/// Nutrient caps derived from state thresholds and the intake target, kg/d.
pub fn nutrient_limits(thr: &StateThresholds, target_dmi: f64) -> (f64, f64, f64, f64) {
    (
        thr.ndf * target_dmi,
        thr.ndf_for * target_dmi,
        thr.starch_max * target_dmi,
        thr.ee_max * target_dmi,
    )
}

/// Build the constraint list for one evaluated diet.
pub fn build_constraints(
    x: &[f64],
    supply: &SupplyVector,
    targets: &NutrientTargets,
    epsilon: f64,
    target_dmi: f64,
    thr: &StateThresholds,
    masks: &CategoryMasks,
    cfg: &ConstraintConfig,
) -> ConstraintSet {
    let mut set = ConstraintSet {
        g: Vec::with_capacity(18),
        scales: Vec::with_capacity(18),
        names: Vec::with_capacity(18),
    };

    // Intake window around the target
    set.push(
        "DMI_max",
        supply.dmi - (cfg.dmi_hi + epsilon) * targets.dmi,
        targets.dmi,
    );
    set.push(
        "DMI_min",
        (cfg.dmi_lo - epsilon) * targets.dmi - supply.dmi,
        targets.dmi,
    );

    // Energy: hard 95% minimum, generous 120% cap over the offset target
    let e_req = 0.95 * targets.energy;
    let e_cap_target = targets.energy + cfg.energy_offset;
    set.push(
        "Energy_max",
        supply.energy - (1.20 + epsilon) * e_cap_target,
        e_cap_target,
    );
    set.push("Energy_min", (e_req - epsilon) - supply.energy, e_req);

    // Metabolizable protein, same envelope shape
    let mp_req = 0.95 * targets.mp_kg;
    let mp_cap_target = targets.mp_kg + cfg.mp_offset;
    set.push(
        "MP_max",
        supply.mp_kg - (1.20 + epsilon) * mp_cap_target,
        mp_cap_target,
    );
    set.push("MP_min", (mp_req - epsilon) - supply.mp_kg, mp_req);

    // Mineral minimums
    set.push("Ca_min", targets.ca_kg - supply.ca_kg, targets.ca_kg);
    set.push("P_min", targets.p_kg - supply.p_kg, targets.p_kg);

    // Fiber, starch and fat envelopes
    set.push(
        "NDF_max",
        supply.ndf_kg - (targets.ndf_max_kg + epsilon),
        targets.ndf_max_kg,
    );
    set.push(
        "NDFfor_min",
        (targets.ndf_forage_min_kg - epsilon) - supply.ndf_forage_kg,
        targets.ndf_forage_min_kg,
    );
    set.push(
        "Starch_max",
        supply.starch_kg - (targets.starch_max_kg + epsilon),
        targets.starch_max_kg,
    );
    set.push(
        "EE_max",
        supply.ee_kg - (targets.ee_max_kg + epsilon),
        targets.ee_max_kg,
    );

    // Ingredient-class constraints: only when the class is present
    if masks.has_straw() {
        let amount = CategoryMasks::masked_sum(&masks.straw, x);
        let limit = thr.forage_straw_max * target_dmi;
        set.push("Straw_max", amount - limit, limit);
    }
    if masks.has_moist_forage() {
        let amount = CategoryMasks::masked_sum(&masks.moist_forage, x);
        let required = thr.moist_forage_min * target_dmi;
        set.push("MoistForage_min", required - amount, required);
    }
    if masks.has_lqf() {
        let amount = CategoryMasks::masked_sum(&masks.lqf, x);
        let limit = thr.forage_fibrous_max * target_dmi;
        set.push("LQF_max", amount - limit, limit);
    }
    if masks.has_wet_byprod() {
        let amount = CategoryMasks::masked_sum(&masks.wet_byprod, x);
        let limit = thr.conc_byprod_max * target_dmi;
        set.push("Byprod_max", amount - limit, limit);
    }
    if masks.has_wet_other() {
        let amount = CategoryMasks::masked_sum(&masks.wet_other, x);
        let limit = thr.other_wet_ingr_max * target_dmi;
        set.push("WetOther_max", amount - limit, limit);
    }

    // Concentrate cap tracks realized intake, not the target
    if supply.dmi > 0.0 && masks.has_concentrate() {
        let conc_kg = CategoryMasks::masked_sum(&masks.conc_all, x);
        let limit = thr.conc_max * supply.dmi;
        set.push(
            "Conc_max",
            conc_kg - limit,
            (thr.conc_max * supply.dmi.max(1e-6)).max(1e-3),
        );
    }

    set
}
