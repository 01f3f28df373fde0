//! Diet report tables: per-ingredient breakdown, proportion tables with
//! forage/concentrate subtotals, ration evaluation, nutrient comparison,
//! water intake and methane indicators.

use crate::analysis::models::{
    DietIngredient, MethaneReport, NutrientComparisonRow, NutrientIntake, ProportionRow,
    RationEvaluationRow,
};
use crate::nutrition::models::{
    AnimalState, EnrichedFeed, FeedType, Requirements, SupplyBalances, SupplyVector,
};
use crate::utils::{safe_divide, dot};

/// Nutrient masses carried by `dm_kg` of one feed, kg/d.
fn ingredient_nutrients(f: &EnrichedFeed, dm_kg: f64) -> NutrientIntake {
    NutrientIntake {
        adf: dm_kg * f.adf / 100.0,
        ndf: dm_kg * f.ndf / 100.0,
        lg: dm_kg * f.lg / 100.0,
        cp: dm_kg * f.cp / 100.0,
        st: dm_kg * f.st / 100.0,
        ee: dm_kg * f.ee / 100.0,
        fa: dm_kg * f.fa / 100.0,
        ash: dm_kg * f.ash / 100.0,
        nfc: dm_kg * f.nfc / 100.0,
        tdn: dm_kg * f.tdn / 100.0,
        ca: dm_kg * f.ca / 100.0,
        p: dm_kg * f.p / 100.0,
    }
}

/// Per-ingredient cost table. As-fed amounts are rounded to 10 g before
/// pricing, matching how rations are weighed out in practice.
pub fn build_breakdown(q: &[f64], feeds: &[EnrichedFeed]) -> (Vec<DietIngredient>, f64) {
    let mut rows = Vec::with_capacity(feeds.len());
    let mut total_cost = 0.0;
    for (amount, feed) in q.iter().zip(feeds) {
        let af_kg = safe_divide(*amount, feed.dm / 100.0, 0.0);
        let af_rounded = (af_kg * 100.0).round() / 100.0;
        let cost = af_rounded * feed.price_per_kg_af;
        total_cost += cost;
        rows.push(DietIngredient {
            name: feed.name.clone(),
            category: feed.category.clone(),
            feed_type: feed.feed_type.to_string(),
            dm_kg: *amount,
            af_kg: af_rounded,
            price_per_kg_af: feed.price_per_kg_af,
            cost,
        });
    }
    (rows, total_cost)
}

pub struct ProportionTables {
    /// Per-ingredient rows plus a trailing `Total` row.
    pub rows: Vec<ProportionRow>,
    pub forage_subtotal: Option<ProportionRow>,
    pub concentrate_subtotal: Option<ProportionRow>,
    pub dm_sum: f64,
    pub af_sum: f64,
}

/// Proportions table on DM and as-fed bases with nutrient intake columns.
pub fn build_proportions(q: &[f64], feeds: &[EnrichedFeed]) -> ProportionTables {
    let breakdown: Vec<(f64, f64)> = q
        .iter()
        .zip(feeds)
        .map(|(amount, feed)| (*amount, safe_divide(*amount, feed.dm / 100.0, 0.0)))
        .collect();
    let dm_sum: f64 = breakdown.iter().map(|(dm, _)| dm).sum();
    let af_sum: f64 = breakdown.iter().map(|(_, af)| af).sum();

    let mut rows = Vec::with_capacity(feeds.len() + 1);
    let mut total = ProportionRow {
        feed_type: String::new(),
        name: "Total".to_string(),
        dm_kg: 0.0,
        af_kg: 0.0,
        dm_pct: 0.0,
        af_pct: 0.0,
        price_per_kg_af: 0.0,
        cost: 0.0,
        nutrients_kg: NutrientIntake::default(),
        nutrients_pct: NutrientIntake::default(),
    };
    let mut forage = total.clone();
    forage.feed_type = FeedType::Forage.to_string();
    let mut concentrate = total.clone();
    concentrate.feed_type = FeedType::Concentrate.to_string();
    let mut any_forage = false;
    let mut any_concentrate = false;

    for ((dm_kg, af_kg), feed) in breakdown.iter().zip(feeds) {
        let nutrients_kg = ingredient_nutrients(feed, *dm_kg);
        let pct_factor = safe_divide(100.0, dm_sum, 0.0);
        let row = ProportionRow {
            feed_type: feed.feed_type.to_string(),
            name: feed.name.clone(),
            dm_kg: *dm_kg,
            af_kg: *af_kg,
            dm_pct: safe_divide(*dm_kg, dm_sum, 0.0) * 100.0,
            af_pct: safe_divide(*af_kg, af_sum, 0.0) * 100.0,
            price_per_kg_af: feed.price_per_kg_af,
            cost: af_kg * feed.price_per_kg_af,
            nutrients_pct: nutrients_kg.scaled(pct_factor),
            nutrients_kg,
        };

        total.dm_kg += row.dm_kg;
        total.af_kg += row.af_kg;
        total.dm_pct += row.dm_pct;
        total.af_pct += row.af_pct;
        total.cost += row.cost;
        total.nutrients_kg.add(&row.nutrients_kg);
        total.nutrients_pct.add(&row.nutrients_pct);

        let bucket = match feed.feed_type {
            FeedType::Forage | FeedType::Pasture => {
                any_forage = true;
                Some(&mut forage)
            }
            FeedType::Concentrate | FeedType::Minerals => {
                any_concentrate = true;
                Some(&mut concentrate)
            }
            _ => None,
        };
        if let Some(sub) = bucket {
            sub.dm_kg += row.dm_kg;
            sub.af_kg += row.af_kg;
            sub.dm_pct += row.dm_pct;
            sub.af_pct += row.af_pct;
            sub.cost += row.cost;
            sub.nutrients_kg.add(&row.nutrients_kg);
            sub.nutrients_pct.add(&row.nutrients_pct);
        }

        rows.push(row);
    }
    rows.push(total);

    ProportionTables {
        rows,
        forage_subtotal: any_forage.then_some(forage),
        concentrate_subtotal: any_concentrate.then_some(concentrate),
        dm_sum,
        af_sum,
    }
}

/// Requirement / supply / balance rows for the headline nutrients.
///
/// Ca and P supplies here are gross dietary masses (the optimizer works on
/// the absorbed basis; both are reported).
pub fn ration_evaluation(
    supply: &SupplyVector,
    balances: &SupplyBalances,
    req: &Requirements,
    q: &[f64],
    feeds: &[EnrichedFeed],
) -> Vec<RationEvaluationRow> {
    let is_heifer = req.state.is_heifer();
    let energy_label = if is_heifer { "ME" } else { "NEL" };
    let energy_req = if is_heifer { req.me_total } else { req.nel_total };

    let ca_gross = dot(q, feeds.iter().map(|f| f.ca / 100.0));
    let p_gross = dot(q, feeds.iter().map(|f| f.p / 100.0));

    vec![
        RationEvaluationRow {
            parameter: "DMI".to_string(),
            requirement: req.target_dmi,
            supply: supply.dmi,
            balance: supply.dmi - req.target_dmi,
        },
        RationEvaluationRow {
            parameter: energy_label.to_string(),
            requirement: energy_req,
            supply: supply.energy,
            balance: supply.energy - energy_req,
        },
        RationEvaluationRow {
            parameter: "MP".to_string(),
            requirement: balances.mp_requirement_kg,
            supply: supply.mp_kg,
            balance: supply.mp_kg - balances.mp_requirement_kg,
        },
        RationEvaluationRow {
            parameter: "Ca".to_string(),
            requirement: req.ca_req_kg,
            supply: ca_gross,
            balance: ca_gross - req.ca_req_kg,
        },
        RationEvaluationRow {
            parameter: "P".to_string(),
            requirement: req.p_req_kg,
            supply: p_gross,
            balance: p_gross - req.p_req_kg,
        },
    ]
}

/// Supplied-vs-target table with range verdicts for the capped nutrients.
pub fn nutrient_comparison(
    supply: &SupplyVector,
    balances: &SupplyBalances,
    req: &Requirements,
    limits: (f64, f64, f64, f64),
) -> Vec<NutrientComparisonRow> {
    let is_heifer = req.state.is_heifer();
    let energy_req = if is_heifer { req.me_total } else { req.nel_total };
    let energy_label = if is_heifer {
        "ME (Mcal/day)"
    } else {
        "NEL (Mcal/day)"
    };
    let (ndf_max, ndf_for_min, st_max, ee_max) = limits;

    let targeted = |nutrient: &str, supplied: f64, target: f64| NutrientComparisonRow {
        nutrient: nutrient.to_string(),
        supplied,
        target: Some(target),
        min_target: None,
        max_target: None,
        verdict: format!("{:+.2}", supplied - target),
    };
    let min_bounded = |nutrient: &str, supplied: f64, min_t: f64| NutrientComparisonRow {
        nutrient: nutrient.to_string(),
        supplied,
        target: None,
        min_target: Some(min_t),
        max_target: None,
        verdict: if supplied >= min_t {
            "Within range".to_string()
        } else {
            "Below minimum".to_string()
        },
    };
    let max_bounded = |nutrient: &str, supplied: f64, max_t: f64| NutrientComparisonRow {
        nutrient: nutrient.to_string(),
        supplied,
        target: None,
        min_target: None,
        max_target: Some(max_t),
        verdict: if supplied <= max_t {
            "Within range".to_string()
        } else {
            "Exceeds limit".to_string()
        },
    };

    vec![
        targeted("DMI (kg/day)", supply.dmi, req.target_dmi),
        targeted(energy_label, supply.energy, energy_req),
        targeted("MP (kg/day)", supply.mp_kg, balances.mp_requirement_kg),
        min_bounded("Ca (kg/day)", supply.ca_kg, req.ca_req_kg),
        min_bounded("P (kg/day)", supply.p_kg, req.p_req_kg),
        max_bounded("NDF (kg/day)", supply.ndf_kg, ndf_max),
        min_bounded("Forage NDF (kg/day)", supply.ndf_forage_kg, ndf_for_min),
        max_bounded("Starch (kg/day)", supply.starch_kg, st_max),
        max_bounded("Fat (kg/day)", supply.ee_kg, ee_max),
    ]
}

/// Predicted drinking water, L/d.
pub fn water_intake(
    dm_sum: f64,
    af_sum: f64,
    q: &[f64],
    feeds: &[EnrichedFeed],
    req: &Requirements,
) -> f64 {
    if dm_sum <= 0.0 {
        return 0.0;
    }
    let dm_prop = safe_divide(dm_sum, af_sum, 0.0) * 100.0;
    let ash_pct = safe_divide(dot(q, feeds.iter().map(|f| f.ash / 100.0)), dm_sum, 0.0) * 100.0;
    let cp_pct = safe_divide(dot(q, feeds.iter().map(|f| f.cp / 100.0)), dm_sum, 0.0) * 100.0;
    let temp = req.env_temp_c;

    match req.state {
        AnimalState::LactatingCow => {
            -68.8 + 2.89 * dm_sum + 0.44 * dm_prop + 5.60 * ash_pct + 1.81 * cp_pct
        }
        _ => 1.16 * dm_sum + 0.23 * dm_prop + 0.44 * temp + 0.061 * (temp - 16.4).powi(2),
    }
}

fn mcr_band(mcr: f64) -> &'static str {
    if mcr < 3.5 {
        "Extremely Low"
    } else if mcr < 4.5 {
        "Very Low"
    } else if mcr < 5.5 {
        "Low"
    } else if mcr < 7.5 {
        "Average"
    } else if mcr < 9.5 {
        "High"
    } else {
        "Above Normal Range"
    }
}

/// Enteric methane indicators by state-specific regression.
pub fn methane_report(q: &[f64], feeds: &[EnrichedFeed], req: &Requirements) -> MethaneReport {
    let dm_sum: f64 = q.iter().sum();
    if dm_sum <= 0.0 {
        return MethaneReport {
            production_g_d: 0.0,
            yield_g_per_kg_dmi: 0.0,
            intensity_g_per_kg_ecm: 0.0,
            conversion_rate_pct: 0.0,
            conversion_band: mcr_band(0.0).to_string(),
            emission_mj_d: 0.0,
        };
    }

    let pct = |attr: &dyn Fn(&EnrichedFeed) -> f64| -> f64 {
        safe_divide(dot(q, feeds.iter().map(|f| attr(f) / 100.0)), dm_sum, 0.0) * 100.0
    };
    let ee_pct = pct(&|f| f.ee);
    let fa_pct = pct(&|f| f.fa);
    let ndf_pct = pct(&|f| f.ndf);
    let cp_pct = pct(&|f| f.cp);
    let ge_diet = dot(q, feeds.iter().map(|f| f.ge));

    let ch4_g = match req.state {
        AnimalState::LactatingCow => 76.0 + 13.5 * dm_sum - 9.55 * ee_pct + 2.24 * ndf_pct,
        AnimalState::DryCow => (0.69 + 0.053 * ge_diet - 0.0789 * fa_pct) * 4184.0 / 55.5,
        AnimalState::Heifer => (-0.038 + 0.051 * ge_diet - 0.0091 * ndf_pct) * 4184.0 / 55.5,
        AnimalState::BabyCalf => 0.0,
    };

    let intensity = -0.101 - 0.215 * dm_sum - 0.118 * cp_pct - 0.323 * ee_pct + 0.120 * ndf_pct
        - 0.253 * req.milk_fat_pct
        + 3.44 * req.milk_true_protein_pct
        + 0.00947 * req.body_weight_kg;

    let ch4_mj = ch4_g * 55.5 / 1000.0;
    let ge_mj = ge_diet * 4.184;
    let mcr = if ge_mj > 0.0 {
        ch4_mj / ge_mj * 100.0
    } else {
        0.0
    };

    MethaneReport {
        production_g_d: ch4_g,
        yield_g_per_kg_dmi: safe_divide(ch4_g, dm_sum, 0.0),
        intensity_g_per_kg_ecm: intensity,
        conversion_rate_pct: mcr,
        conversion_band: mcr_band(mcr).to_string(),
        emission_mj_d: ch4_mj,
    }
}
