use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{self, Result};

// ======================================================================
// ANIMAL-SIDE MODELS
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimalState {
    #[serde(rename = "Lactating Cow")]
    LactatingCow,
    #[serde(rename = "Dry Cow")]
    DryCow,
    #[serde(rename = "Heifer")]
    Heifer,
    #[serde(rename = "Baby Calf/Heifer", alias = "Baby Calf")]
    BabyCalf,
}

impl AnimalState {
    pub fn is_heifer(&self) -> bool {
        matches!(self, AnimalState::Heifer)
    }

    pub fn is_lactating(&self) -> bool {
        matches!(self, AnimalState::LactatingCow)
    }

    /// Heifer requirements and supplies are expressed in ME, cow ones in NEL.
    pub fn energy_basis(&self) -> EnergyBasis {
        if self.is_heifer() {
            EnergyBasis::MetabolizableEnergy
        } else {
            EnergyBasis::NetEnergyLactation
        }
    }
}

impl fmt::Display for AnimalState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnimalState::LactatingCow => write!(f, "Lactating Cow"),
            AnimalState::DryCow => write!(f, "Dry Cow"),
            AnimalState::Heifer => write!(f, "Heifer"),
            AnimalState::BabyCalf => write!(f, "Baby Calf/Heifer"),
        }
    }
}

/// Unit carried by the scalar "energy" slots of supplies and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyBasis {
    #[serde(rename = "NEL")]
    NetEnergyLactation,
    #[serde(rename = "ME")]
    MetabolizableEnergy,
}

impl fmt::Display for EnergyBasis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnergyBasis::NetEnergyLactation => write!(f, "NEL"),
            EnergyBasis::MetabolizableEnergy => write!(f, "ME"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Breed {
    Holstein,
    Indigenous,
    Crossbred,
    Other,
}

impl Breed {
    pub fn mature_weight_kg(&self) -> f64 {
        match self {
            Breed::Holstein | Breed::Crossbred => 600.0,
            _ => 550.0,
        }
    }
}

impl fmt::Display for Breed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Breed::Holstein => write!(f, "Holstein"),
            Breed::Indigenous => write!(f, "Indigenous"),
            Breed::Crossbred => write!(f, "Crossbred"),
            Breed::Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topography {
    Flat,
    Hilly,
    Mountainous,
    VeryMountainous,
}

impl Topography {
    /// Elevation proxy in meters used by the activity-energy term.
    pub fn elevation_m(&self) -> f64 {
        match self {
            Topography::Flat => 0.0,
            Topography::Hilly => 50.0,
            Topography::Mountainous => 200.0,
            Topography::VeryMountainous => 500.0,
        }
    }
}

impl Default for Topography {
    fn default() -> Self {
        Topography::Flat
    }
}

fn default_breed() -> Breed {
    Breed::Holstein
}
fn default_bw() -> f64 {
    600.0
}
fn default_bcs() -> f64 {
    3.0
}
fn default_parity() -> u32 {
    2
}
fn default_lact_day() -> f64 {
    100.0
}
fn default_frame_gain() -> f64 {
    0.2
}
fn default_milk() -> f64 {
    25.0
}
fn default_milk_tp() -> f64 {
    3.2
}
fn default_milk_fat() -> f64 {
    3.8
}
fn default_temp() -> f64 {
    20.0
}

/// Immutable animal profile consumed by the requirements calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimalInputs {
    pub state: AnimalState,
    #[serde(default = "default_breed")]
    pub breed: Breed,
    #[serde(default = "default_bw")]
    pub body_weight_kg: f64,
    #[serde(default = "default_bcs")]
    pub body_condition_score: f64,
    #[serde(default = "default_parity")]
    pub parity: u32,
    #[serde(default = "default_lact_day")]
    pub lactation_day: f64,
    #[serde(default)]
    pub gestation_day: f64,
    #[serde(default = "default_frame_gain")]
    pub target_frame_gain_kg_d: f64,
    #[serde(default)]
    pub target_reserve_gain_kg_d: f64,
    #[serde(default = "default_milk")]
    pub target_milk_l_d: f64,
    #[serde(default = "default_milk_tp")]
    pub milk_true_protein_pct: f64,
    #[serde(default = "default_milk_fat")]
    pub milk_fat_pct: f64,
    #[serde(default = "default_temp")]
    pub env_temp_c: f64,
    #[serde(default)]
    pub grazing: bool,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub topography: Topography,
}

impl AnimalInputs {
    pub fn validate(&self) -> Result<()> {
        utils::validate_body_weight(self.body_weight_kg)?;
        utils::validate_body_condition(self.body_condition_score)?;
        if self.state == AnimalState::BabyCalf && self.body_weight_kg > 100.0 {
            return Err(crate::utils::RationError::InvalidInput(format!(
                "baby calf body weight capped at 100 kg, got {}",
                self.body_weight_kg
            )));
        }
        for (label, v) in [
            ("lactation_day", self.lactation_day),
            ("gestation_day", self.gestation_day),
            ("target_milk_l_d", self.target_milk_l_d),
            ("milk_true_protein_pct", self.milk_true_protein_pct),
            ("milk_fat_pct", self.milk_fat_pct),
            ("distance_km", self.distance_km),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(crate::utils::RationError::InvalidInput(format!(
                    "{label} must be a non-negative number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Milk feeding schedule returned for baby calves (formulation stops there).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilkSchedule {
    pub milk_total_l: f64,
    pub milk_morning_l: f64,
    pub milk_evening_l: f64,
}

/// Daily requirement targets produced by the requirements calculator.
///
/// Energies are Mcal/d, metabolizable protein components g/d, macro-mineral
/// totals g/d (with the absorbed Ca/P also in kg/d for the optimizer),
/// trace minerals mg/d, vitamins IU/d.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirements {
    // Processed animal inputs
    pub state: AnimalState,
    pub breed: Breed,
    pub body_weight_kg: f64,
    pub mature_weight_kg: f64,
    pub metabolic_weight_kg: f64,
    pub body_condition_score: f64,
    pub parity: u32,
    pub lactation_day: f64,
    pub gestation_day: f64,
    pub body_gain_kg_d: f64,
    pub env_temp_c: f64,
    pub energy_basis: EnergyBasis,

    // Milk targets (kg basis; liters converted with 1.03 density)
    pub milk_kg_d: f64,
    pub milk_true_protein_pct: f64,
    pub milk_fat_pct: f64,
    pub milk_lactose_pct: f64,
    pub ne_milk_per_kg: f64,
    pub ne_milk_total: f64,

    // Intake
    pub target_dmi: f64,
    pub dmi_pct_bw: f64,
    pub dmi_pct_mbw: f64,
    pub milk_schedule: Option<MilkSchedule>,

    // Energy
    pub nel_maintenance: f64,
    pub nel_activity: f64,
    pub me_maintenance: f64,
    pub nel_lactation: f64,
    pub pregnant: bool,
    pub me_gestation: f64,
    pub nel_gestation: f64,
    pub me_gain: f64,
    pub nel_gain: f64,
    pub me_total: f64,
    pub nel_total: f64,

    // Metabolizable protein, g/d (maintenance MP is diet-dependent and
    // computed inside the supply evaluator)
    pub mp_lactation: f64,
    pub mp_growth: f64,
    pub mp_pregnancy: f64,

    // Macro minerals, g/d (absorbed basis for Ca/P)
    pub ca_req_g: f64,
    pub p_req_g: f64,
    pub ca_req_kg: f64,
    pub p_req_kg: f64,
    pub mg_req: f64,
    pub na_req: f64,
    pub cl_req: f64,
    pub k_req: f64,
    pub s_req: f64,

    // Trace minerals, mg/d
    pub co_req: f64,
    pub cu_req: f64,
    pub i_req: f64,
    pub fe_req: f64,
    pub mn_req: f64,
    pub se_req: f64,
    pub zn_req: f64,

    // Vitamins, IU/d
    pub vit_a_req: f64,
    pub vit_d_req: f64,
    pub vit_e_req: f64,
}

// ======================================================================
// FEED-SIDE MODELS
// ======================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedType {
    Forage,
    Concentrate,
    Minerals,
    Additive,
    Pasture,
    Other,
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeedType::Forage => write!(f, "Forage"),
            FeedType::Concentrate => write!(f, "Concentrate"),
            FeedType::Minerals => write!(f, "Minerals"),
            FeedType::Additive => write!(f, "Additive"),
            FeedType::Pasture => write!(f, "Pasture"),
            FeedType::Other => write!(f, "Other"),
        }
    }
}

/// Raw feed composition row as entered in the catalog.
///
/// Composition fields are % of DM unless noted; price is per as-fed kg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRow {
    pub name: String,
    #[serde(rename = "type")]
    pub feed_type: FeedType,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price_per_kg_af: f64,
    #[serde(default)]
    pub dm: f64,
    #[serde(default)]
    pub ash: f64,
    #[serde(default)]
    pub cp: f64,
    #[serde(default)]
    pub npn_cp: f64,
    #[serde(default)]
    pub ee: f64,
    #[serde(default)]
    pub cf: f64,
    #[serde(default)]
    pub nfe: f64,
    #[serde(default)]
    pub st: f64,
    #[serde(default)]
    pub ndf: f64,
    #[serde(default)]
    pub hemicellulose: f64,
    #[serde(default)]
    pub adf: f64,
    #[serde(default)]
    pub cellulose: f64,
    #[serde(default)]
    pub lg: f64,
    #[serde(default)]
    pub ndin: f64,
    #[serde(default)]
    pub adin: f64,
    #[serde(default)]
    pub ca: f64,
    #[serde(default)]
    pub p: f64,
    /// Ca/P absorption coefficients; defaulted by feed class when absent.
    #[serde(default)]
    pub ac_ca: Option<f64>,
    #[serde(default)]
    pub ac_p: Option<f64>,
    /// Fixed as-fed amount, kg/d. Only read in Evaluate mode.
    #[serde(default)]
    pub quantity_as_fed: Option<f64>,
}

/// Feed row enriched with every derived attribute the optimizer reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedFeed {
    pub name: String,
    pub feed_type: FeedType,
    pub category: String,
    pub price_per_kg_af: f64,
    pub cost_per_dm_kg: f64,

    // Raw composition, % of DM
    pub dm: f64,
    pub ash: f64,
    pub cp: f64,
    pub npn_cp: f64,
    pub ee: f64,
    pub st: f64,
    pub ndf: f64,
    pub adf: f64,
    pub lg: f64,
    pub ndin: f64,
    pub adin: f64,
    pub ca: f64,
    pub p: f64,

    // Derived fractions, % of DM
    pub om: f64,
    pub nfc: f64,
    pub ndfip: f64,
    pub adfip: f64,
    pub ndfn: f64,
    pub td_nfc: f64,
    pub td_cp: f64,
    pub fa: f64,
    pub td_ndf: f64,

    // Energy, Mcal/kg DM (TDN % of DM)
    pub ge: f64,
    pub de: f64,
    pub me: f64,
    pub tdn: f64,
    pub nel: f64,

    // Mineral absorption coefficients
    pub ac_ca: f64,
    pub ac_p: f64,

    // Per-kg nutrient masses (kg nutrient per kg DM of the feed)
    pub cp_kg: f64,
    pub ndf_kg: f64,
    pub forage_ndf_kg: f64,
    pub st_kg: f64,
    pub ee_kg: f64,
    pub ca_kg: f64,
    pub p_kg: f64,

    // Classification flags
    pub is_fat: bool,
    pub is_mineral: bool,
    pub is_concentrate: bool,
    pub is_byproduct: bool,

    /// Carried through from the raw row for Evaluate mode.
    pub quantity_as_fed: Option<f64>,
}

/// Which ingredient-class constraints apply to a given catalog.
#[derive(Debug, Clone, Default)]
pub struct CategoryMasks {
    pub straw: Vec<bool>,
    pub moist_forage: Vec<bool>,
    pub lqf: Vec<bool>,
    pub wet_byprod: Vec<bool>,
    pub wet_other: Vec<bool>,
    pub conc_all: Vec<bool>,
    pub urea: Vec<bool>,
    pub mineral: Vec<bool>,
}

impl CategoryMasks {
    pub fn has_straw(&self) -> bool {
        self.straw.iter().any(|&b| b)
    }
    pub fn has_moist_forage(&self) -> bool {
        self.moist_forage.iter().any(|&b| b)
    }
    pub fn has_lqf(&self) -> bool {
        self.lqf.iter().any(|&b| b)
    }
    pub fn has_wet_byprod(&self) -> bool {
        self.wet_byprod.iter().any(|&b| b)
    }
    pub fn has_wet_other(&self) -> bool {
        self.wet_other.iter().any(|&b| b)
    }
    pub fn has_concentrate(&self) -> bool {
        self.conc_all.iter().any(|&b| b)
    }
    pub fn has_urea(&self) -> bool {
        self.urea.iter().any(|&b| b)
    }

    /// Total kg of the ingredients selected by `mask`.
    pub fn masked_sum(mask: &[bool], amounts: &[f64]) -> f64 {
        amounts
            .iter()
            .zip(mask)
            .filter(|(_, &m)| m)
            .map(|(a, _)| *a)
            .sum()
    }
}

// ======================================================================
// SUPPLY MODELS
// ======================================================================

/// Daily nutrient supply of a candidate diet, fixed slot order.
///
/// `energy` carries ME for heifers and NEL for cows (see [`EnergyBasis`]);
/// both raw values are also kept in `nel`/`me`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupplyVector {
    pub dmi: f64,
    pub energy: f64,
    pub mp_kg: f64,
    pub ca_kg: f64,
    pub p_kg: f64,
    pub ndf_kg: f64,
    pub ndf_forage_kg: f64,
    pub starch_kg: f64,
    pub ee_kg: f64,
    pub nel: f64,
    pub me: f64,
}

impl SupplyVector {
    /// The nine slots matched against `NutrientTargets` by the constraint
    /// builder, in constraint order.
    pub fn core(&self) -> [f64; 9] {
        [
            self.dmi,
            self.energy,
            self.mp_kg,
            self.ca_kg,
            self.p_kg,
            self.ndf_kg,
            self.ndf_forage_kg,
            self.starch_kg,
            self.ee_kg,
        ]
    }
}

/// Balance terms reported alongside the supply vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupplyBalances {
    pub dmi: f64,
    pub nel_balance: f64,
    /// Total MP requirement including the diet-dependent maintenance part, kg/d.
    pub mp_requirement_kg: f64,
    /// MP balance through the gross-energy-ratio utilizable-CP pathway, kg/d.
    pub protein_balance_kg: f64,
    pub me_balance: f64,
}

/// Per-evaluation nutrient targets, aligned with `SupplyVector::core`.
#[derive(Debug, Clone, Copy)]
pub struct NutrientTargets {
    pub dmi: f64,
    pub energy: f64,
    pub mp_kg: f64,
    pub ca_kg: f64,
    pub p_kg: f64,
    pub ndf_max_kg: f64,
    pub ndf_forage_min_kg: f64,
    pub starch_max_kg: f64,
    pub ee_max_kg: f64,
}

impl NutrientTargets {
    pub fn as_array(&self) -> [f64; 9] {
        [
            self.dmi,
            self.energy,
            self.mp_kg,
            self.ca_kg,
            self.p_kg,
            self.ndf_max_kg,
            self.ndf_forage_min_kg,
            self.starch_max_kg,
            self.ee_max_kg,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serde_round_trip() {
        let s: AnimalState = serde_json::from_str("\"Lactating Cow\"").unwrap();
        assert_eq!(s, AnimalState::LactatingCow);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"Lactating Cow\"");
        let calf: AnimalState = serde_json::from_str("\"Baby Calf/Heifer\"").unwrap();
        assert_eq!(calf, AnimalState::BabyCalf);
    }

    #[test]
    fn test_energy_basis_by_state() {
        assert_eq!(
            AnimalState::Heifer.energy_basis(),
            EnergyBasis::MetabolizableEnergy
        );
        assert_eq!(
            AnimalState::LactatingCow.energy_basis(),
            EnergyBasis::NetEnergyLactation
        );
        assert_eq!(
            AnimalState::DryCow.energy_basis(),
            EnergyBasis::NetEnergyLactation
        );
    }

    #[test]
    fn test_mature_weight_by_breed() {
        assert_eq!(Breed::Holstein.mature_weight_kg(), 600.0);
        assert_eq!(Breed::Crossbred.mature_weight_kg(), 600.0);
        assert_eq!(Breed::Indigenous.mature_weight_kg(), 550.0);
    }

    #[test]
    fn test_baby_calf_weight_cap() {
        let inputs = AnimalInputs {
            state: AnimalState::BabyCalf,
            breed: Breed::Holstein,
            body_weight_kg: 140.0,
            body_condition_score: 3.0,
            parity: 0,
            lactation_day: 0.0,
            gestation_day: 0.0,
            target_frame_gain_kg_d: 0.2,
            target_reserve_gain_kg_d: 0.0,
            target_milk_l_d: 0.0,
            milk_true_protein_pct: 3.2,
            milk_fat_pct: 3.8,
            env_temp_c: 20.0,
            grazing: false,
            distance_km: 0.0,
            topography: Topography::Flat,
        };
        assert!(inputs.validate().is_err());
    }

    #[test]
    fn test_masked_sum() {
        let mask = vec![true, false, true];
        let amounts = vec![1.0, 2.0, 4.0];
        assert_eq!(CategoryMasks::masked_sum(&mask, &amounts), 5.0);
    }
}
