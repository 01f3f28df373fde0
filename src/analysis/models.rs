use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::nutrition::models::{
    EnergyBasis, MilkSchedule, Requirements, SupplyBalances, SupplyVector,
};
use crate::optimization::selection::{Confidence, DietStatus};
use crate::optimization::severity::SeverityBand;
use crate::utils::finite_or_zero;

// ======================================================================
// MESSAGES
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageLevel {
    Info,
    Warn,
    Error,
    Blocker,
}

/// Structured diagnostic accumulated through the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub level: MessageLevel,
    pub code: String,
    pub r#where: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Message {
    pub fn new(level: MessageLevel, code: &str, location: &str, summary: impl Into<String>) -> Self {
        Self {
            level,
            code: code.to_string(),
            r#where: location.to_string(),
            summary: summary.into(),
            detail: None,
            hint: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ======================================================================
// TABLES
// ======================================================================

/// One ingredient of the final diet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietIngredient {
    pub name: String,
    pub category: String,
    pub feed_type: String,
    pub dm_kg: f64,
    pub af_kg: f64,
    pub price_per_kg_af: f64,
    pub cost: f64,
}

/// Per-ingredient nutrient intake block (kg/d or % of DM depending on table).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NutrientIntake {
    pub adf: f64,
    pub ndf: f64,
    pub lg: f64,
    pub cp: f64,
    pub st: f64,
    pub ee: f64,
    pub fa: f64,
    pub ash: f64,
    pub nfc: f64,
    pub tdn: f64,
    pub ca: f64,
    pub p: f64,
}

impl NutrientIntake {
    pub fn add(&mut self, other: &NutrientIntake) {
        self.adf += other.adf;
        self.ndf += other.ndf;
        self.lg += other.lg;
        self.cp += other.cp;
        self.st += other.st;
        self.ee += other.ee;
        self.fa += other.fa;
        self.ash += other.ash;
        self.nfc += other.nfc;
        self.tdn += other.tdn;
        self.ca += other.ca;
        self.p += other.p;
    }

    pub fn scaled(&self, factor: f64) -> NutrientIntake {
        NutrientIntake {
            adf: self.adf * factor,
            ndf: self.ndf * factor,
            lg: self.lg * factor,
            cp: self.cp * factor,
            st: self.st * factor,
            ee: self.ee * factor,
            fa: self.fa * factor,
            ash: self.ash * factor,
            nfc: self.nfc * factor,
            tdn: self.tdn * factor,
            ca: self.ca * factor,
            p: self.p * factor,
        }
    }
}

/// Row of the proportions table (per ingredient, plus subtotal rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProportionRow {
    pub feed_type: String,
    pub name: String,
    pub dm_kg: f64,
    pub af_kg: f64,
    pub dm_pct: f64,
    pub af_pct: f64,
    pub price_per_kg_af: f64,
    pub cost: f64,
    pub nutrients_kg: NutrientIntake,
    pub nutrients_pct: NutrientIntake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RationEvaluationRow {
    pub parameter: String,
    pub requirement: f64,
    pub supply: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutrientComparisonRow {
    pub nutrient: String,
    pub supplied: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_target: Option<f64>,
    pub verdict: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethaneReport {
    pub production_g_d: f64,
    pub yield_g_per_kg_dmi: f64,
    pub intensity_g_per_kg_ecm: f64,
    pub conversion_rate_pct: f64,
    pub conversion_band: String,
    pub emission_mj_d: f64,
}

/// Evaluate-mode milk support projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilkProjection {
    pub milk_target_kg_d: f64,
    pub milk_energy_supported_kg_d: f64,
    pub milk_protein_supported_kg_d: f64,
    pub milk_supported_kg_d: f64,
    pub limiting_nutrient: String,
    pub nel_available_mcal: f64,
    pub mp_available_kg: f64,
    pub dmi_status: String,
    pub dmi_actual: f64,
    pub dmi_target: f64,
    pub dmi_difference: f64,
    pub dmi_percent: f64,
    pub diet_cost_total_af: f64,
    pub feed_cost_per_kg_milk: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Adequacy {
    pub dmi_pct: f64,
    pub energy_pct: f64,
    pub protein_pct: f64,
}

// ======================================================================
// RESULT
// ======================================================================

/// The externally visible outcome of one formulation or evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietResult {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub status: DietStatus,
    /// Status with structural-conflict annotation, e.g. `INFEASIBLE|CONFLICT:E`.
    pub status_detail: String,
    pub confidence: Confidence,
    pub energy_basis: EnergyBasis,

    pub total_cost_as_fed: f64,
    pub water_intake_l_d: f64,

    pub breakdown: Vec<DietIngredient>,
    pub proportions: Vec<ProportionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forage_subtotal: Option<ProportionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concentrate_subtotal: Option<ProportionRow>,
    pub ration_evaluation: Vec<RationEvaluationRow>,
    pub nutrient_comparison: Vec<NutrientComparisonRow>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub methane: Option<MethaneReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adequacy: Option<Adequacy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply: Option<SupplyVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balances: Option<SupplyBalances>,
    /// Full requirement set (energy, protein, every mineral and vitamin)
    /// the diet was formulated against.
    pub requirements: Requirements,

    pub constraint_severities: BTreeMap<String, SeverityBand>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub messages: Vec<Message>,
    pub cleaning_log: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub milk_projection: Option<MilkProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milk_schedule: Option<MilkSchedule>,
}

impl DietResult {
    /// Final sweep: no NaN/∞ ever leaves the engine.
    pub fn sweep_non_finite(&mut self) {
        self.total_cost_as_fed = finite_or_zero(self.total_cost_as_fed);
        self.water_intake_l_d = finite_or_zero(self.water_intake_l_d);
        for row in &mut self.breakdown {
            row.dm_kg = finite_or_zero(row.dm_kg);
            row.af_kg = finite_or_zero(row.af_kg);
            row.price_per_kg_af = finite_or_zero(row.price_per_kg_af);
            row.cost = finite_or_zero(row.cost);
        }
        let sweep_nutrients = |n: &mut NutrientIntake| {
            n.adf = finite_or_zero(n.adf);
            n.ndf = finite_or_zero(n.ndf);
            n.lg = finite_or_zero(n.lg);
            n.cp = finite_or_zero(n.cp);
            n.st = finite_or_zero(n.st);
            n.ee = finite_or_zero(n.ee);
            n.fa = finite_or_zero(n.fa);
            n.ash = finite_or_zero(n.ash);
            n.nfc = finite_or_zero(n.nfc);
            n.tdn = finite_or_zero(n.tdn);
            n.ca = finite_or_zero(n.ca);
            n.p = finite_or_zero(n.p);
        };
        let sweep_row = |row: &mut ProportionRow| {
            row.dm_kg = finite_or_zero(row.dm_kg);
            row.af_kg = finite_or_zero(row.af_kg);
            row.dm_pct = finite_or_zero(row.dm_pct);
            row.af_pct = finite_or_zero(row.af_pct);
            row.price_per_kg_af = finite_or_zero(row.price_per_kg_af);
            row.cost = finite_or_zero(row.cost);
            sweep_nutrients(&mut row.nutrients_kg);
            sweep_nutrients(&mut row.nutrients_pct);
        };
        for row in &mut self.proportions {
            sweep_row(row);
        }
        if let Some(row) = &mut self.forage_subtotal {
            sweep_row(row);
        }
        if let Some(row) = &mut self.concentrate_subtotal {
            sweep_row(row);
        }
        for row in &mut self.ration_evaluation {
            row.requirement = finite_or_zero(row.requirement);
            row.supply = finite_or_zero(row.supply);
            row.balance = finite_or_zero(row.balance);
        }
        for row in &mut self.nutrient_comparison {
            row.supplied = finite_or_zero(row.supplied);
            row.target = row.target.map(finite_or_zero);
            row.min_target = row.min_target.map(finite_or_zero);
            row.max_target = row.max_target.map(finite_or_zero);
        }
        if let Some(m) = &mut self.methane {
            m.production_g_d = finite_or_zero(m.production_g_d);
            m.yield_g_per_kg_dmi = finite_or_zero(m.yield_g_per_kg_dmi);
            m.intensity_g_per_kg_ecm = finite_or_zero(m.intensity_g_per_kg_ecm);
            m.conversion_rate_pct = finite_or_zero(m.conversion_rate_pct);
            m.emission_mj_d = finite_or_zero(m.emission_mj_d);
        }
        if let Some(a) = &mut self.adequacy {
            a.dmi_pct = finite_or_zero(a.dmi_pct);
            a.energy_pct = finite_or_zero(a.energy_pct);
            a.protein_pct = finite_or_zero(a.protein_pct);
        }
        if let Some(s) = &mut self.supply {
            s.dmi = finite_or_zero(s.dmi);
            s.energy = finite_or_zero(s.energy);
            s.mp_kg = finite_or_zero(s.mp_kg);
            s.ca_kg = finite_or_zero(s.ca_kg);
            s.p_kg = finite_or_zero(s.p_kg);
            s.ndf_kg = finite_or_zero(s.ndf_kg);
            s.ndf_forage_kg = finite_or_zero(s.ndf_forage_kg);
            s.starch_kg = finite_or_zero(s.starch_kg);
            s.ee_kg = finite_or_zero(s.ee_kg);
            s.nel = finite_or_zero(s.nel);
            s.me = finite_or_zero(s.me);
        }
        if let Some(b) = &mut self.balances {
            b.dmi = finite_or_zero(b.dmi);
            b.nel_balance = finite_or_zero(b.nel_balance);
            b.mp_requirement_kg = finite_or_zero(b.mp_requirement_kg);
            b.protein_balance_kg = finite_or_zero(b.protein_balance_kg);
            b.me_balance = finite_or_zero(b.me_balance);
        }
        if let Some(p) = &mut self.milk_projection {
            p.milk_target_kg_d = finite_or_zero(p.milk_target_kg_d);
            p.milk_energy_supported_kg_d = finite_or_zero(p.milk_energy_supported_kg_d);
            p.milk_protein_supported_kg_d = finite_or_zero(p.milk_protein_supported_kg_d);
            p.milk_supported_kg_d = finite_or_zero(p.milk_supported_kg_d);
            p.nel_available_mcal = finite_or_zero(p.nel_available_mcal);
            p.mp_available_kg = finite_or_zero(p.mp_available_kg);
            p.dmi_actual = finite_or_zero(p.dmi_actual);
            p.dmi_target = finite_or_zero(p.dmi_target);
            p.dmi_difference = finite_or_zero(p.dmi_difference);
            p.dmi_percent = finite_or_zero(p.dmi_percent);
            p.diet_cost_total_af = finite_or_zero(p.diet_cost_total_af);
            p.feed_cost_per_kg_milk = finite_or_zero(p.feed_cost_per_kg_milk);
        }
    }
}
