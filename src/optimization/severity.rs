//! Severity classification.
//!
//! Maps per-constraint deviations into {perfect, good, marginal,
//! infeasible} bands through the state-specific tolerance tables, detects
//! structural energy/protein conflicts, and folds everything into one
//! overall satisfaction flag.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::nutrition::models::{AnimalState, NutrientTargets, SupplyVector};
use crate::optimization::constants::{tolerance, tolerance_key, Basis, ToleranceBand, ToleranceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    Perfect,
    Good,
    Marginal,
    Infeasible,
}

impl fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SeverityBand::Perfect => write!(f, "perfect"),
            SeverityBand::Good => write!(f, "good"),
            SeverityBand::Marginal => write!(f, "marginal"),
            SeverityBand::Infeasible => write!(f, "infeasible"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Over,
    Under,
    Within,
}

/// One classified constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConstraintEval {
    pub band: SeverityBand,
    pub direction: Direction,
    /// Position inside the band, 0..1 (capped for the open infeasible band).
    pub norm_distance: f64,
    /// Signed percent deviation (positive = above target/limit).
    pub raw_deviation: f64,
}

/// Signed percent deviation of `actual` against `target`.
pub fn signed_deviation(actual: f64, target: f64) -> f64 {
    (actual - target) / target.max(1e-12) * 100.0
}

/// Which side of the envelope a `both`-type constraint guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSide {
    Minimum,
    Maximum,
}

fn guard_of(name: &str) -> GuardSide {
    if name.ends_with("_min") {
        GuardSide::Minimum
    } else {
        GuardSide::Maximum
    }
}

/// Canonical lowercase id for a built constraint name.
pub fn canonical_name(name: &str) -> String {
    match name {
        "DMI_max" => "dmi_max".into(),
        "DMI_min" => "dmi_min".into(),
        "Energy_max" => "energy_max".into(),
        "Energy_min" => "energy_min".into(),
        "MP_max" => "protein_max".into(),
        "MP_min" => "protein_min".into(),
        "Ca_min" => "ca_min".into(),
        "P_min" => "p_min".into(),
        "NDF_max" => "ndf_max".into(),
        "NDFfor_min" => "ndf_for_min".into(),
        "Starch_max" => "starch_max".into(),
        "EE_max" => "fat_max".into(),
        "Straw_max" => "forage_straw_max".into(),
        "MoistForage_min" => "moist_forage_min".into(),
        "LQF_max" => "forage_fibrous_max".into(),
        "Byprod_max" => "conc_byprod_max".into(),
        "WetOther_max" => "other_wet_ingr_max".into(),
        "Conc_max" => "conc_max".into(),
        other => other.to_lowercase().replace([' ', '-'], "_"),
    }
}

/// Place a signed deviation into its severity band given the tolerance
/// config and which side the constraint guards.
pub fn pick_band(band_cfg: &ToleranceBand, pct_dev: f64, guard: Option<GuardSide>) -> ConstraintEval {
    let (direction, magnitude) = match band_cfg.basis {
        Basis::Limit => {
            if pct_dev > 0.0 {
                (Direction::Over, pct_dev)
            } else {
                (Direction::Within, 0.0)
            }
        }
        Basis::Target => match band_cfg.tolerance_type {
            ToleranceType::Minimum => {
                if pct_dev < 0.0 {
                    (Direction::Under, -pct_dev)
                } else {
                    (Direction::Within, 0.0)
                }
            }
            ToleranceType::Maximum => {
                if pct_dev > 0.0 {
                    (Direction::Over, pct_dev)
                } else {
                    (Direction::Within, 0.0)
                }
            }
            ToleranceType::Both => match guard {
                Some(GuardSide::Minimum) => {
                    if pct_dev < 0.0 {
                        (Direction::Under, -pct_dev)
                    } else {
                        (Direction::Within, 0.0)
                    }
                }
                Some(GuardSide::Maximum) => {
                    if pct_dev > 0.0 {
                        (Direction::Over, pct_dev)
                    } else {
                        (Direction::Within, 0.0)
                    }
                }
                None => {
                    let dir = if pct_dev > 0.0 {
                        Direction::Over
                    } else if pct_dev < 0.0 {
                        Direction::Under
                    } else {
                        Direction::Within
                    };
                    (dir, pct_dev.abs())
                }
            },
        },
    };

    let eps = 1e-9;
    let bands = [
        (SeverityBand::Perfect, band_cfg.perfect),
        (SeverityBand::Good, band_cfg.good),
        (SeverityBand::Marginal, band_cfg.marginal),
        (SeverityBand::Infeasible, band_cfg.infeasible),
    ];
    for (band, (lo, hi)) in bands {
        let inside = if band == SeverityBand::Perfect {
            magnitude + eps >= lo && magnitude - eps <= hi
        } else {
            lo <= magnitude + eps && magnitude + eps < hi + eps
        };
        if inside {
            let span = (hi - lo).max(1e-9);
            let norm = if span.is_finite() {
                ((magnitude - lo) / span).clamp(0.0, 1.0)
            } else {
                ((magnitude - lo) / 100.0).clamp(0.0, 1.0)
            };
            return ConstraintEval {
                band,
                direction,
                norm_distance: norm,
                raw_deviation: pct_dev,
            };
        }
    }

    // Past every band end: cap in the infeasible band.
    ConstraintEval {
        band: SeverityBand::Infeasible,
        direction,
        norm_distance: 1.0,
        raw_deviation: pct_dev,
    }
}


/// Classify every built constraint of one evaluation.
///
/// Keys of the returned map are canonical lowercase ids.
pub fn evaluate_severities(
    x: &[f64],
    supply: &SupplyVector,
    targets: &NutrientTargets,
    state: AnimalState,
    thr: &crate::optimization::constants::StateThresholds,
    masks: &crate::nutrition::models::CategoryMasks,
    constraint_names: &[&'static str],
) -> BTreeMap<String, ConstraintEval> {
    let mut out = BTreeMap::new();
    let supply_core = supply.core();
    let target_core = targets.as_array();

    // Core constraints share a (supply slot, target slot) with the builder.
    let core_slot = |name: &str| -> Option<usize> {
        Some(match name {
            "DMI_max" | "DMI_min" => 0,
            "Energy_max" | "Energy_min" => 1,
            "MP_max" | "MP_min" => 2,
            "Ca_min" => 3,
            "P_min" => 4,
            "NDF_max" => 5,
            "NDFfor_min" => 6,
            "Starch_max" => 7,
            "EE_max" => 8,
            _ => return None,
        })
    };

    for &name in constraint_names {
        if let Some(slot) = core_slot(name) {
            let target = target_core[slot];
            if target <= 0.0 {
                continue;
            }
            let actual = supply_core[slot];
            let key = match tolerance_key(name) {
                Some(k) => k,
                None => continue,
            };
            let cfg = match tolerance(state, key) {
                Some(c) => c,
                None => continue,
            };
            let eval = pick_band(&cfg, signed_deviation(actual, target), Some(guard_of(name)));
            out.insert(canonical_name(name), eval);
            continue;
        }

        // Ingredient-class constraints re-derive amount vs. limit from the
        // masks, mirroring the builder.
        let (amount, limit, key) = match name {
            "Straw_max" => (
                crate::nutrition::models::CategoryMasks::masked_sum(&masks.straw, x),
                thr.forage_straw_max * targets.dmi,
                "forage_straw_max",
            ),
            "MoistForage_min" => (
                crate::nutrition::models::CategoryMasks::masked_sum(&masks.moist_forage, x),
                thr.moist_forage_min * targets.dmi,
                "moist_forage_min",
            ),
            "LQF_max" => (
                crate::nutrition::models::CategoryMasks::masked_sum(&masks.lqf, x),
                thr.forage_fibrous_max * targets.dmi,
                "forage_fibrous_max",
            ),
            "Byprod_max" => (
                crate::nutrition::models::CategoryMasks::masked_sum(&masks.wet_byprod, x),
                thr.conc_byprod_max * targets.dmi,
                "conc_byprod_max",
            ),
            "WetOther_max" => (
                crate::nutrition::models::CategoryMasks::masked_sum(&masks.wet_other, x),
                thr.other_wet_ingr_max * targets.dmi,
                "other_wet_ingr_max",
            ),
            "Conc_max" => (
                crate::nutrition::models::CategoryMasks::masked_sum(&masks.conc_all, x),
                thr.conc_max * supply.dmi,
                "conc_max",
            ),
            _ => continue,
        };
        if limit <= 0.0 {
            continue;
        }
        if let Some(cfg) = tolerance(state, key) {
            let eval = pick_band(&cfg, signed_deviation(amount, limit), None);
            out.insert(canonical_name(name), eval);
        }
    }

    out
}

// ======================================================================
// OVERALL FLAG
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusBand {
    Perfect,
    Good,
    Marginal,
    Infeasible,
}

/// Overall satisfaction of one diet, including structural conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub band: StatusBand,
    pub conflict_energy: bool,
    pub conflict_protein: bool,
}

impl OverallAssessment {
    pub fn is_acceptable(&self) -> bool {
        !matches!(self.band, StatusBand::Infeasible)
    }
}

impl fmt::Display for OverallAssessment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.band {
            StatusBand::Perfect => write!(f, "PERFECT"),
            StatusBand::Good => write!(f, "GOOD"),
            StatusBand::Marginal => write!(f, "MARGINAL"),
            StatusBand::Infeasible => match (self.conflict_energy, self.conflict_protein) {
                (true, true) => write!(f, "INFEASIBLE|CONFLICT:E&MP"),
                (true, false) => write!(f, "INFEASIBLE|CONFLICT:E"),
                (false, true) => write!(f, "INFEASIBLE|CONFLICT:MP"),
                (false, false) => write!(f, "INFEASIBLE"),
            },
        }
    }
}

const CRITICAL_NAMES: [&str; 6] = [
    "dmi_min",
    "dmi_max",
    "energy_min",
    "energy_max",
    "protein_min",
    "protein_max",
];

fn is_safety_violation(name: &str, band: SeverityBand) -> bool {
    match name {
        "dmi_min" | "dmi_max" => matches!(band, SeverityBand::Marginal | SeverityBand::Infeasible),
        "energy_min" | "energy_max" | "protein_min" | "protein_max" => {
            band == SeverityBand::Infeasible
        }
        _ => false,
    }
}

/// Detect whether the diet's nutrient density makes the energy/protein
/// minimums structurally unreachable inside the intake cap.
pub fn detect_conflicts(
    supply: &SupplyVector,
    targets: &NutrientTargets,
    epsilon: f64,
    dmi_hi: f64,
) -> (bool, bool) {
    let eps = 1e-6;
    let dmi_cap = (dmi_hi + epsilon) * targets.dmi;
    let e_min = 0.95 * targets.energy - epsilon;
    let mp_min = 0.95 * targets.mp_kg - epsilon;

    let e_density = supply.energy / supply.dmi.max(eps);
    let mp_density = supply.mp_kg / supply.dmi.max(eps);

    let dmi_for_e = e_min / e_density.max(eps);
    let dmi_for_mp = mp_min / mp_density.max(eps);

    (dmi_for_e > dmi_cap + 1e-9, dmi_for_mp > dmi_cap + 1e-9)
}

/// Fold per-constraint severities into the overall flag.
pub fn overall_flag(
    severities: &BTreeMap<String, ConstraintEval>,
    supply: &SupplyVector,
    targets: &NutrientTargets,
    epsilon: f64,
    dmi_hi: f64,
) -> OverallAssessment {
    let (conflict_energy, conflict_protein) = detect_conflicts(supply, targets, epsilon, dmi_hi);

    if conflict_energy || conflict_protein {
        return OverallAssessment {
            band: StatusBand::Infeasible,
            conflict_energy,
            conflict_protein,
        };
    }

    let mut safety_violations = 0usize;
    let mut infeasible_total = 0usize;
    let mut critical_infeasible = 0usize;
    let mut perfect = 0usize;
    let mut good = 0usize;
    let mut marginal = 0usize;

    for (name, eval) in severities {
        if is_safety_violation(name, eval.band) {
            safety_violations += 1;
        }
        match eval.band {
            SeverityBand::Perfect => perfect += 1,
            SeverityBand::Good => good += 1,
            SeverityBand::Marginal => marginal += 1,
            SeverityBand::Infeasible => {
                infeasible_total += 1;
                if CRITICAL_NAMES.contains(&name.as_str()) {
                    critical_infeasible += 1;
                }
            }
        }
    }

    let total = severities.len();
    let infeasible_band = OverallAssessment {
        band: StatusBand::Infeasible,
        conflict_energy: false,
        conflict_protein: false,
    };

    if critical_infeasible > 0 || safety_violations > 1 || infeasible_total > 1 {
        return infeasible_band;
    }
    if total == 0 {
        return OverallAssessment {
            band: StatusBand::Marginal,
            conflict_energy: false,
            conflict_protein: false,
        };
    }
    if marginal + infeasible_total >= 4 {
        return infeasible_band;
    }

    let band = if perfect as f64 >= total as f64 * 0.85 {
        StatusBand::Perfect
    } else if (perfect + good) as f64 >= total as f64 * 0.75 {
        StatusBand::Good
    } else {
        StatusBand::Marginal
    };
    OverallAssessment {
        band,
        conflict_energy: false,
        conflict_protein: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::constants::tolerance;

    fn dmi_band() -> ToleranceBand {
        tolerance(AnimalState::LactatingCow, "dmi").unwrap()
    }

    #[test]
    fn test_band_monotone_in_deviation() {
        let cfg = dmi_band();
        let mut last = SeverityBand::Perfect;
        for dev in [0.0, 2.0, 6.0, 9.0, 13.0, 40.0] {
            let eval = pick_band(&cfg, -dev, Some(GuardSide::Minimum));
            assert!(eval.band >= last, "band regressed at dev {dev}");
            last = eval.band;
        }
        assert_eq!(last, SeverityBand::Infeasible);
    }

    #[test]
    fn test_min_guard_ignores_surplus() {
        let cfg = tolerance(AnimalState::LactatingCow, "ca").unwrap();
        let eval = pick_band(&cfg, 35.0, None);
        assert_eq!(eval.band, SeverityBand::Perfect);
        assert_eq!(eval.direction, Direction::Within);
        let eval = pick_band(&cfg, -35.0, None);
        assert_eq!(eval.band, SeverityBand::Infeasible);
        assert_eq!(eval.direction, Direction::Under);
    }

    #[test]
    fn test_limit_basis_only_counts_excess() {
        let cfg = tolerance(AnimalState::LactatingCow, "ndf").unwrap();
        assert_eq!(pick_band(&cfg, -50.0, None).band, SeverityBand::Perfect);
        assert_eq!(pick_band(&cfg, 8.0, None).band, SeverityBand::Good);
        assert_eq!(pick_band(&cfg, 40.0, None).band, SeverityBand::Infeasible);
    }

    fn targets() -> NutrientTargets {
        NutrientTargets {
            dmi: 20.0,
            energy: 30.0,
            mp_kg: 2.0,
            ca_kg: 0.08,
            p_kg: 0.05,
            ndf_max_kg: 16.0,
            ndf_forage_min_kg: 4.0,
            starch_max_kg: 5.2,
            ee_max_kg: 1.4,
        }
    }

    fn supply_with_density(energy_per_kg: f64) -> SupplyVector {
        SupplyVector {
            dmi: 20.0,
            energy: energy_per_kg * 20.0,
            mp_kg: 2.0,
            ca_kg: 0.09,
            p_kg: 0.06,
            ndf_kg: 7.0,
            ndf_forage_kg: 5.0,
            starch_kg: 4.0,
            ee_kg: 0.8,
            nel: energy_per_kg * 20.0,
            me: 37.0,
        }
    }

    #[test]
    fn test_energy_conflict_detection() {
        // 0.8 Mcal/kg cannot reach 28.5 Mcal inside 21 kg of intake
        let (e, mp) = detect_conflicts(&supply_with_density(0.8), &targets(), 0.0, 1.05);
        assert!(e);
        assert!(!mp);
        // 1.6 Mcal/kg reaches the minimum comfortably
        let (e, _) = detect_conflicts(&supply_with_density(1.6), &targets(), 0.0, 1.05);
        assert!(!e);
    }

    #[test]
    fn test_overall_flag_critical_infeasible() {
        let mut severities = BTreeMap::new();
        severities.insert(
            "energy_min".to_string(),
            ConstraintEval {
                band: SeverityBand::Infeasible,
                direction: Direction::Under,
                norm_distance: 1.0,
                raw_deviation: -40.0,
            },
        );
        for key in ["dmi_min", "protein_min", "ca_min", "p_min"] {
            severities.insert(
                key.to_string(),
                ConstraintEval {
                    band: SeverityBand::Perfect,
                    direction: Direction::Within,
                    norm_distance: 0.0,
                    raw_deviation: 0.0,
                },
            );
        }
        let flag = overall_flag(&severities, &supply_with_density(1.6), &targets(), 0.0, 1.05);
        assert_eq!(flag.band, StatusBand::Infeasible);
    }

    #[test]
    fn test_overall_flag_all_perfect() {
        let mut severities = BTreeMap::new();
        for key in [
            "dmi_min",
            "dmi_max",
            "energy_min",
            "energy_max",
            "protein_min",
            "protein_max",
            "ca_min",
            "p_min",
        ] {
            severities.insert(
                key.to_string(),
                ConstraintEval {
                    band: SeverityBand::Perfect,
                    direction: Direction::Within,
                    norm_distance: 0.0,
                    raw_deviation: 0.0,
                },
            );
        }
        let flag = overall_flag(&severities, &supply_with_density(1.6), &targets(), 0.0, 1.05);
        assert_eq!(flag.band, StatusBand::Perfect);
        assert_eq!(flag.to_string(), "PERFECT");
    }

    #[test]
    fn test_four_marginals_fail() {
        let mut severities = BTreeMap::new();
        for key in ["ndf_max", "starch_max", "fat_max", "conc_max"] {
            severities.insert(
                key.to_string(),
                ConstraintEval {
                    band: SeverityBand::Marginal,
                    direction: Direction::Over,
                    norm_distance: 0.5,
                    raw_deviation: 12.0,
                },
            );
        }
        for key in ["dmi_min", "energy_min", "protein_min", "ca_min"] {
            severities.insert(
                key.to_string(),
                ConstraintEval {
                    band: SeverityBand::Perfect,
                    direction: Direction::Within,
                    norm_distance: 0.0,
                    raw_deviation: 0.0,
                },
            );
        }
        let flag = overall_flag(&severities, &supply_with_density(1.6), &targets(), 0.0, 1.05);
        assert_eq!(flag.band, StatusBand::Infeasible);
    }

    #[test]
    fn test_conflict_reported_in_display() {
        let flag = OverallAssessment {
            band: StatusBand::Infeasible,
            conflict_energy: true,
            conflict_protein: false,
        };
        assert_eq!(flag.to_string(), "INFEASIBLE|CONFLICT:E");
    }
}
