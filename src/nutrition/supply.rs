//! Diet supply evaluation.
//!
//! Pure function from (ingredient amounts, enriched feeds, requirements)
//! to the nutrient supply vector, balance terms and the diet-dependent
//! maintenance protein. Called once per optimizer evaluation, so it works
//! on plain slices and never allocates more than its local per-feed
//! buffers.

use crate::nutrition::models::{EnrichedFeed, Requirements, SupplyBalances, SupplyVector};
use crate::utils::{dot, safe_divide, RationError, Result};

/// Dietary crude protein → metabolizable protein efficiency (NRC 2001).
/// Flagged as optimistic in the literature; kept for numeric compatibility.
pub const MP_FROM_CP_EFFICIENCY: f64 = 0.67;

/// NP→MP efficiency used for the maintenance protein pathway.
pub const KM_MP_NP_MAINT: f64 = 0.65;

const BODY_NP_CP: f64 = 0.86;

/// Digestibility discount applied at the diet level when energy density
/// exceeds maintenance-level TDN (NRC 2001 plane-of-nutrition discount).
pub fn calculate_discount(total_tdn_kg: f64, dmi: f64, mbw: f64) -> f64 {
    if dmi < 1e-6 || total_tdn_kg < 0.0 {
        return 1.0;
    }
    let tdn_conc = safe_divide(total_tdn_kg, dmi, 0.0) * 100.0;
    if tdn_conc < 60.0 {
        return 1.0;
    }
    let maint_tdn = 0.035 * mbw;
    let dmi_to_maint = if total_tdn_kg >= maint_tdn {
        total_tdn_kg / maint_tdn
    } else {
        1.0
    };
    (tdn_conc - (0.18 * tdn_conc - 10.3) * (dmi_to_maint - 1.0)) / tdn_conc
}

/// Actual ME per feed from discounted DE.
///
/// Fat supplements pass DE through unchanged; mineral sources carry none.
pub fn me_actual(feed: &EnrichedFeed, de_act: f64) -> f64 {
    if feed.is_mineral {
        return 0.0;
    }
    if feed.is_fat {
        return de_act.max(0.0);
    }
    let mut me = 1.01 * de_act - 0.45;
    if feed.ee >= 3.0 {
        me += 0.0046 * (feed.ee - 3.0);
    }
    me.max(0.0)
}

/// Evaluate the nutrient supply of `x` kg DM/d per feed.
///
/// Returns the supply vector, balance terms, and the maintenance MP (g/d)
/// that the fixed requirement set cannot know because it depends on the
/// diet's NDF concentration and realized intake.
pub fn diet_supply(
    x: &[f64],
    feeds: &[EnrichedFeed],
    req: &Requirements,
) -> Result<(SupplyVector, SupplyBalances, f64)> {
    if x.len() != feeds.len() {
        return Err(RationError::InvalidDiet(format!(
            "amount vector length {} does not match feed count {}",
            x.len(),
            feeds.len()
        )));
    }
    if x.iter().any(|&v| v < 0.0) {
        return Err(RationError::InvalidDiet(
            "negative feed amounts not allowed".to_string(),
        ));
    }

    let dmi: f64 = x.iter().sum();
    if dmi < 1e-6 {
        return Err(RationError::InvalidDiet(
            "total dry matter intake is zero".to_string(),
        ));
    }

    let total_tdn = dot(x, feeds.iter().map(|f| f.tdn / 100.0));
    let discount = calculate_discount(total_tdn, dmi, req.metabolic_weight_kg);

    let de_act: Vec<f64> = feeds.iter().map(|f| f.de * discount).collect();
    let me_act: Vec<f64> = feeds
        .iter()
        .zip(&de_act)
        .map(|(f, &de)| me_actual(f, de))
        .collect();

    let nel_diet = dot(x, me_act.iter().copied()) * 0.66;
    let me_diet = dot(x, de_act.iter().copied()) * 0.82;

    // Maintenance protein: scurf + urinary endogenous + fecal endogenous,
    // the fecal term scaling with dietary NDF and realized intake.
    let ndf_pct = safe_divide(dot(x, feeds.iter().map(|f| f.ndf)), dmi, 0.0);
    let bw = req.body_weight_kg;
    let scrf_cp_g = 0.20 * bw.powf(0.60);
    let scrf_np_g = scrf_cp_g * BODY_NP_CP;
    let fe_cpend_g = (12.0 + 0.12 * ndf_pct) * dmi;
    let fe_npend_g = fe_cpend_g * 0.73;
    let ur_npend_g = 0.053 * bw * 6.25;
    let npm_use_g = scrf_np_g + ur_npend_g + fe_npend_g;
    let mp_maintenance_g = npm_use_g / KM_MP_NP_MAINT;

    let mut total_mp_req_g =
        mp_maintenance_g + req.mp_growth + req.mp_pregnancy + req.mp_lactation;

    let is_heifer = req.state.is_heifer();
    if is_heifer {
        // NASEM 2021 safety floor for growing heifers
        let mp_min_g =
            (53.0 - 25.0 * (bw / req.mature_weight_kg)) * (req.nel_total / 0.66);
        if total_mp_req_g < mp_min_g {
            total_mp_req_g = mp_min_g;
        }
    }
    let mp_requirement_kg = total_mp_req_g / 1000.0;

    let energy = if is_heifer { me_diet } else { nel_diet };

    let total_cp_g = dot(x, feeds.iter().map(|f| f.cp_kg)) * 1000.0;
    let total_me_mj = dot(x, me_act.iter().copied()) * 4.184;
    let util_cp_g = 8.76 * total_me_mj + 0.36 * total_cp_g;
    let mp_ger_kg = util_cp_g * 0.73 * 0.85 / 1000.0;
    let protein_balance_kg = mp_ger_kg - mp_requirement_kg;

    let supply = SupplyVector {
        dmi,
        energy,
        mp_kg: total_cp_g * MP_FROM_CP_EFFICIENCY / 1000.0,
        ca_kg: dot(x, feeds.iter().map(|f| f.ca_kg)),
        p_kg: dot(x, feeds.iter().map(|f| f.p_kg)),
        ndf_kg: dot(x, feeds.iter().map(|f| f.ndf_kg)),
        ndf_forage_kg: dot(x, feeds.iter().map(|f| f.forage_ndf_kg)),
        starch_kg: dot(x, feeds.iter().map(|f| f.st_kg)),
        ee_kg: dot(x, feeds.iter().map(|f| f.ee_kg)),
        nel: nel_diet,
        me: me_diet,
    };

    let balances = SupplyBalances {
        dmi,
        nel_balance: nel_diet - req.nel_total,
        mp_requirement_kg,
        protein_balance_kg,
        me_balance: me_diet - req.me_total,
    };

    Ok((supply, balances, mp_maintenance_g))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::feeds::enrich_feeds;
    use crate::nutrition::models::{
        AnimalInputs, AnimalState, Breed, FeedRow, FeedType, Topography,
    };
    use crate::nutrition::requirements::calculate_requirements;

    fn test_requirements(state: AnimalState) -> Requirements {
        let inputs = AnimalInputs {
            state,
            breed: Breed::Holstein,
            body_weight_kg: if state == AnimalState::Heifer { 350.0 } else { 650.0 },
            body_condition_score: 3.0,
            parity: if state == AnimalState::Heifer { 0 } else { 2 },
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
        };
        calculate_requirements(&inputs).unwrap()
    }

    fn two_feeds() -> Vec<crate::nutrition::models::EnrichedFeed> {
        let rows = vec![
            FeedRow {
                name: "Alfalfa hay".to_string(),
                feed_type: FeedType::Forage,
                category: "Legume hay".to_string(),
                price_per_kg_af: 0.20,
                dm: 88.0,
                ash: 10.0,
                cp: 19.0,
                npn_cp: 0.0,
                ee: 2.3,
                cf: 0.0,
                nfe: 0.0,
                st: 2.0,
                ndf: 42.0,
                hemicellulose: 0.0,
                adf: 32.0,
                cellulose: 0.0,
                lg: 7.0,
                ndin: 0.3,
                adin: 0.2,
                ca: 1.4,
                p: 0.26,
                ac_ca: None,
                ac_p: None,
                quantity_as_fed: None,
            },
            FeedRow {
                name: "Corn grain".to_string(),
                feed_type: FeedType::Concentrate,
                category: "Cereal grain".to_string(),
                price_per_kg_af: 0.25,
                dm: 88.0,
                ash: 1.5,
                cp: 9.4,
                npn_cp: 0.0,
                ee: 4.2,
                cf: 0.0,
                nfe: 0.0,
                st: 72.0,
                ndf: 9.5,
                hemicellulose: 0.0,
                adf: 3.4,
                cellulose: 0.0,
                lg: 1.1,
                ndin: 0.08,
                adin: 0.04,
                ca: 0.04,
                p: 0.30,
                ac_ca: None,
                ac_p: None,
                quantity_as_fed: None,
            },
        ];
        enrich_feeds(&rows).unwrap()
    }

    #[test]
    fn test_discount_low_density_is_unity() {
        // 50% TDN diet stays below the 60% discount threshold
        assert_eq!(calculate_discount(10.0, 20.0, 650f64.powf(0.75)), 1.0);
    }

    #[test]
    fn test_discount_high_density_below_one() {
        let mbw = 650f64.powf(0.75);
        // 75% TDN at well above maintenance intake gets discounted
        let d = calculate_discount(15.0, 20.0, mbw);
        assert!(d < 1.0 && d > 0.7);
    }

    #[test]
    fn test_me_actual_special_cases() {
        let feeds = two_feeds();
        // corn grain has EE >= 3 so it earns the fat correction
        let base = 1.01 * 3.0 - 0.45;
        let corrected = me_actual(&feeds[1], 3.0);
        assert!((corrected - (base + 0.0046 * (feeds[1].ee - 3.0))).abs() < 1e-12);

        let mut fat = feeds[1].clone();
        fat.is_fat = true;
        assert_eq!(me_actual(&fat, 3.0), 3.0);

        let mut mineral = feeds[1].clone();
        mineral.is_mineral = true;
        assert_eq!(me_actual(&mineral, 3.0), 0.0);
    }

    #[test]
    fn test_supply_rejects_bad_vectors() {
        let feeds = two_feeds();
        let req = test_requirements(AnimalState::LactatingCow);
        assert!(diet_supply(&[1.0], &feeds, &req).is_err());
        assert!(diet_supply(&[1.0, -0.5], &feeds, &req).is_err());
        assert!(diet_supply(&[0.0, 0.0], &feeds, &req).is_err());
    }

    #[test]
    fn test_supply_linear_fields_scale() {
        let feeds = two_feeds();
        let req = test_requirements(AnimalState::LactatingCow);
        let (s1, _, _) = diet_supply(&[6.0, 4.0], &feeds, &req).unwrap();
        let (s2, _, _) = diet_supply(&[12.0, 8.0], &feeds, &req).unwrap();
        assert!((s2.dmi - 2.0 * s1.dmi).abs() < 1e-9);
        assert!((s2.mp_kg - 2.0 * s1.mp_kg).abs() < 1e-9);
        assert!((s2.ndf_kg - 2.0 * s1.ndf_kg).abs() < 1e-9);
        assert!((s2.ca_kg - 2.0 * s1.ca_kg).abs() < 1e-9);
    }

    #[test]
    fn test_energy_basis_switches_with_state() {
        let feeds = two_feeds();
        let x = [6.0, 4.0];
        let cow = test_requirements(AnimalState::LactatingCow);
        let (cow_supply, _, _) = diet_supply(&x, &feeds, &cow).unwrap();
        assert!((cow_supply.energy - cow_supply.nel).abs() < 1e-12);

        let heifer = test_requirements(AnimalState::Heifer);
        let (h_supply, _, _) = diet_supply(&x, &feeds, &heifer).unwrap();
        assert!((h_supply.energy - h_supply.me).abs() < 1e-12);
    }

    #[test]
    fn test_maintenance_mp_tracks_ndf() {
        let feeds = two_feeds();
        let req = test_requirements(AnimalState::LactatingCow);
        // forage-heavy diet carries more NDF, so fecal endogenous CP rises
        let (_, _, mpm_forage) = diet_supply(&[9.0, 1.0], &feeds, &req).unwrap();
        let (_, _, mpm_grain) = diet_supply(&[1.0, 9.0], &feeds, &req).unwrap();
        assert!(mpm_forage > mpm_grain);
    }

    #[test]
    fn test_heifer_mp_floor_applies() {
        let feeds = two_feeds();
        let req = test_requirements(AnimalState::Heifer);
        let (_, balances, _) = diet_supply(&[4.0, 4.0], &feeds, &req).unwrap();
        let floor_g =
            (53.0 - 25.0 * (req.body_weight_kg / req.mature_weight_kg)) * (req.nel_total / 0.66);
        assert!(balances.mp_requirement_kg * 1000.0 >= floor_g - 1e-9);
    }
}
