//! Static formulation thresholds and severity tolerance tables.
//!
//! Everything here is keyed by physiological state. Thresholds bound the
//! ingredient mix (as fractions of target DMI unless noted); tolerance
//! tables drive the severity classifier; count rules decide which
//! marginal/infeasible findings count toward the overall INFEASIBLE tally.

use crate::nutrition::models::AnimalState;

/// Ingredient-mix and nutrient-cap thresholds for one animal state.
///
/// Fractions of target DMI except `mineral_min_kg`/`mineral_max_kg`
/// (kg/d) and `urea_max` (fraction of total intake).
#[derive(Debug, Clone, Copy)]
pub struct StateThresholds {
    pub forage_straw_max: f64,
    pub forage_wet_max: f64,
    pub forage_fibrous_max: f64,
    pub ndf: f64,
    pub ndf_for: f64,
    pub starch_max: f64,
    pub ee_max: f64,
    pub conc_byprod_max: f64,
    pub conc_max: f64,
    pub other_wet_ingr_max: f64,
    pub moist_forage_min: f64,
    pub mineral_min_kg: f64,
    pub mineral_max_kg: f64,
    pub urea_max: f64,
}

pub fn thresholds(state: AnimalState) -> StateThresholds {
    match state {
        AnimalState::LactatingCow | AnimalState::BabyCalf => StateThresholds {
            forage_straw_max: 0.20,
            forage_wet_max: 0.10,
            forage_fibrous_max: 0.10,
            ndf: 0.80,
            ndf_for: 0.20,
            starch_max: 0.26,
            ee_max: 0.07,
            conc_byprod_max: 0.40,
            conc_max: 0.60,
            other_wet_ingr_max: 0.20,
            moist_forage_min: 0.20,
            mineral_min_kg: 0.05,
            mineral_max_kg: 0.80,
            urea_max: 0.01,
        },
        AnimalState::DryCow => StateThresholds {
            forage_straw_max: 0.20,
            forage_wet_max: 0.40,
            forage_fibrous_max: 0.50,
            ndf: 0.75,
            ndf_for: 0.25,
            starch_max: 0.15,
            ee_max: 0.06,
            conc_byprod_max: 0.20,
            conc_max: 0.40,
            other_wet_ingr_max: 0.10,
            moist_forage_min: 0.30,
            mineral_min_kg: 0.05,
            mineral_max_kg: 0.80,
            urea_max: 0.01,
        },
        AnimalState::Heifer => StateThresholds {
            forage_straw_max: 0.15,
            forage_wet_max: 0.40,
            forage_fibrous_max: 0.50,
            ndf: 0.75,
            ndf_for: 0.25,
            starch_max: 0.18,
            ee_max: 0.06,
            conc_byprod_max: 0.20,
            conc_max: 0.50,
            other_wet_ingr_max: 0.08,
            moist_forage_min: 0.25,
            mineral_min_kg: 0.05,
            mineral_max_kg: 0.80,
            urea_max: 0.01,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    /// Deviation measured around a target value (shortfalls and excesses).
    Target,
    /// Deviation measured only above a cap.
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceType {
    Minimum,
    Maximum,
    Both,
}

/// Absolute percent-deviation intervals for the four severity bands.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceBand {
    pub basis: Basis,
    pub tolerance_type: ToleranceType,
    pub perfect: (f64, f64),
    pub good: (f64, f64),
    pub marginal: (f64, f64),
    pub infeasible: (f64, f64),
}

const fn band(
    basis: Basis,
    tolerance_type: ToleranceType,
    p: f64,
    g: f64,
    m: f64,
) -> ToleranceBand {
    ToleranceBand {
        basis,
        tolerance_type,
        perfect: (0.0, p),
        good: (p, g),
        marginal: (g, m),
        infeasible: (m, f64::INFINITY),
    }
}

/// Tolerance table lookup for a canonical constraint key.
pub fn tolerance(state: AnimalState, key: &str) -> Option<ToleranceBand> {
    use Basis::*;
    use ToleranceType::*;

    let critical_hi = if state == AnimalState::LactatingCow {
        15.0
    } else {
        20.0
    };

    let b = match key {
        "dmi" => band(Target, Both, 5.0, 8.0, 12.0),
        "energy" | "protein" => band(Target, Both, 5.0, 10.0, critical_hi),
        "ca" | "p" => band(Target, Minimum, 5.0, 15.0, 30.0),
        "ndf_for" => band(Target, Minimum, 5.0, 15.0, 30.0),
        "moist_forage_min" => band(Target, Minimum, 10.0, 25.0, 50.0),
        "ndf" => band(Limit, Maximum, 5.0, 15.0, 30.0),
        "starch" | "fat" => {
            if state == AnimalState::LactatingCow {
                band(Limit, Maximum, 5.0, 10.0, 20.0)
            } else {
                band(Limit, Maximum, 5.0, 15.0, 30.0)
            }
        }
        "conc_max" | "conc_byprod_max" | "other_wet_ingr_max" | "forage_straw_max"
        | "forage_fibrous_max" => band(Limit, Maximum, 5.0, 15.0, 30.0),
        "urea_max" => band(Limit, Maximum, 0.0, 5.0, 10.0),
        _ => return None,
    };
    Some(b)
}

/// Map a built constraint name to its tolerance table key.
pub fn tolerance_key(constraint_name: &str) -> Option<&'static str> {
    Some(match constraint_name {
        "DMI_max" | "DMI_min" => "dmi",
        "Energy_max" | "Energy_min" => "energy",
        "MP_max" | "MP_min" => "protein",
        "Ca_min" => "ca",
        "P_min" => "p",
        "NDF_max" => "ndf",
        "NDFfor_min" => "ndf_for",
        "Starch_max" => "starch",
        "EE_max" => "fat",
        "Straw_max" => "forage_straw_max",
        "MoistForage_min" => "moist_forage_min",
        "LQF_max" => "forage_fibrous_max",
        "Byprod_max" => "conc_byprod_max",
        "WetOther_max" => "other_wet_ingr_max",
        "Conc_max" => "conc_max",
        _ => return None,
    })
}

/// Which marginal/infeasible findings count toward the INFEASIBLE tally,
/// per deviation direction.
#[derive(Debug, Clone, Copy)]
pub struct CountRule {
    pub marginal_under: bool,
    pub marginal_over: bool,
    pub infeasible_under: bool,
    pub infeasible_over: bool,
}

pub fn count_rule(key: &str) -> CountRule {
    let r = |mu, mo, iu, io| CountRule {
        marginal_under: mu,
        marginal_over: mo,
        infeasible_under: iu,
        infeasible_over: io,
    };
    match key {
        // criticals: an energy/protein surplus only warns at marginal
        "dmi" => r(true, true, true, true),
        "energy" | "protein" => r(true, false, true, true),
        // minerals are fine when over; only a real deficit counts
        "ca" | "p" => r(false, false, true, false),
        // structural fiber minimum
        "ndf_for" => r(false, false, true, false),
        // total fiber / rapid carbs / fat / mix caps: only hard overshoot counts
        "ndf" | "starch" | "fat" | "conc_max" | "conc_byprod_max" | "other_wet_ingr_max"
        | "forage_straw_max" | "forage_fibrous_max" => r(false, false, false, true),
        "moist_forage_min" => r(false, false, true, false),
        _ => r(true, true, true, true),
    }
}

/// Constraints whose violations drive the warning engine first.
pub const CRITICAL_KEYS: [&str; 4] = ["protein", "energy", "dmi", "ndf_for"];

/// Presentation caps for the guidance lists.
pub const MAX_CRITICAL_LINES: usize = 4;
pub const MAX_ACTIONS: usize = 4;
