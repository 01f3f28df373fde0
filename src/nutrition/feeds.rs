//! Feed enrichment.
//!
//! Turns raw catalog rows into the derived form the optimizer reads:
//! true-digestible fractions, digestible/metabolizable energy, absorption
//! coefficients, per-kg nutrient masses and classification flags. Energy
//! follows NRC (2001) summative equations with the Weiss et al. (2018)
//! gross-energy coefficients.

use log::debug;

use crate::nutrition::models::{CategoryMasks, EnrichedFeed, FeedRow, FeedType};
use crate::utils::{non_negative, safe_divide, Result};

const DE_NFC: f64 = 4.2;
const DE_NDF: f64 = 4.2;
const DE_CP: f64 = 5.6;
const DE_FA: f64 = 9.4;
const DE_LOSS: f64 = 0.3;
const EN_RESIDUAL_OM: f64 = 0.042;

/// Categories whose crude protein contributes no digestible protein.
const ZERO_TDCP_CATEGORIES: [&str; 3] = ["Minerals", "Additive", "Sugar/Sugar Alcohol"];

fn is_byproduct_category(category: &str) -> bool {
    let c = category.to_lowercase();
    c.contains("byprod") || c.contains("by-prod") || c.contains("by prod")
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// Derive the full attribute set for one feed row.
fn enrich_row(row: &FeedRow) -> EnrichedFeed {
    let dm = sanitize(row.dm);
    let ash = sanitize(row.ash);
    let cp = sanitize(row.cp);
    let npn_cp = sanitize(row.npn_cp);
    let ee = sanitize(row.ee);
    let st = sanitize(row.st);
    let ndf = sanitize(row.ndf);
    let adf = sanitize(row.adf);
    let lg = sanitize(row.lg);
    let ndin = sanitize(row.ndin);
    let adin = sanitize(row.adin);
    let ca = sanitize(row.ca);
    let p = sanitize(row.p);
    let price = sanitize(row.price_per_kg_af);

    let is_minerals_category = row.category.trim() == "Minerals";

    // Concentrate-typed mineral premixes are reclassified outright.
    let feed_type = if row.feed_type == FeedType::Concentrate && is_minerals_category {
        FeedType::Minerals
    } else {
        row.feed_type.clone()
    };

    let om = non_negative(100.0 - ash);
    let nfc = non_negative(om - (ndf + ee + cp));
    let ndfip = ndin * 6.25;
    let adfip = adin * 6.25;
    let ndfn = non_negative(ndf - ndfip);
    let td_nfc = non_negative(0.98 * (100.0 - (ndfn + cp + ee + ash)));

    let td_cp = if ZERO_TDCP_CATEGORIES
        .iter()
        .any(|c| row.category.trim() == *c)
    {
        0.0
    } else {
        match feed_type {
            FeedType::Forage | FeedType::Concentrate => {
                if cp != 0.0 {
                    cp * (-1.2 * (adfip / cp)).exp()
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    };

    let fa = if ee < 1.0 { 0.0 } else { ee - 1.0 };

    let td_ndf = if ndfn > 0.0 && lg > 0.0 {
        non_negative(0.75 * (ndfn - lg) * (1.0 - (lg / ndfn).powf(0.667)))
    } else {
        0.0
    };

    let mut ge = non_negative(
        cp * DE_CP / 100.0 + fa * DE_FA / 100.0 + (100.0 - cp - fa - ash) * EN_RESIDUAL_OM,
    );
    let mut de = non_negative(
        td_nfc / 100.0 * DE_NFC + td_ndf / 100.0 * DE_NDF + td_cp / 100.0 * DE_CP
            + fa / 100.0 * DE_FA
            - DE_LOSS,
    );

    // Urea-like additives lose digestible energy with NPN load.
    if row.category.trim() == "Additive" && npn_cp > 0.0 {
        de *= 1.0 - cp * npn_cp / 28200.0;
    }

    if is_minerals_category {
        ge = 0.0;
        de = 0.0;
    }

    let me = non_negative(0.82 * de);
    let tdn = non_negative(100.0 * de / 4.4);
    let nel = non_negative(0.0245 * tdn - 0.12);

    let is_forage = feed_type == FeedType::Forage;
    let ac_ca = match row.ac_ca {
        Some(v) if v > 0.0 => v,
        _ => {
            if is_forage {
                0.4
            } else {
                0.6
            }
        }
    };
    let ac_p = match row.ac_p {
        Some(v) if v > 0.0 => v,
        _ => {
            if is_forage {
                0.64
            } else {
                0.7
            }
        }
    };

    let ndf_kg = ndf / 100.0;

    EnrichedFeed {
        name: row.name.trim().to_string(),
        is_fat: ee > 50.0,
        is_mineral: feed_type == FeedType::Minerals || is_minerals_category,
        is_concentrate: feed_type == FeedType::Concentrate,
        is_byproduct: is_byproduct_category(&row.category),
        category: row.category.clone(),
        price_per_kg_af: price,
        cost_per_dm_kg: safe_divide(price, dm / 100.0, 0.0),
        dm,
        ash,
        cp,
        npn_cp,
        ee,
        st,
        ndf,
        adf,
        lg,
        ndin,
        adin,
        ca,
        p,
        om,
        nfc,
        ndfip,
        adfip,
        ndfn,
        td_nfc,
        td_cp,
        fa,
        td_ndf,
        ge,
        de,
        me,
        tdn,
        nel,
        ac_ca,
        ac_p,
        cp_kg: cp / 100.0,
        ndf_kg,
        forage_ndf_kg: if is_forage { ndf_kg } else { 0.0 },
        st_kg: st / 100.0,
        ee_kg: ee / 100.0,
        ca_kg: ca * ac_ca / 100.0,
        p_kg: p * ac_p / 100.0,
        quantity_as_fed: row.quantity_as_fed,
        feed_type,
    }
}

/// Enrich a catalog, dropping rows with empty names.
pub fn enrich_feeds(rows: &[FeedRow]) -> Result<Vec<EnrichedFeed>> {
    let enriched: Vec<EnrichedFeed> = rows
        .iter()
        .filter(|r| !r.name.trim().is_empty())
        .map(enrich_row)
        .collect();
    debug!("enriched {} of {} feed rows", enriched.len(), rows.len());
    Ok(enriched)
}

/// Ingredient-class membership used by the conditional constraints.
pub fn detect_categories(feeds: &[EnrichedFeed]) -> CategoryMasks {
    let mut masks = CategoryMasks::default();
    for f in feeds {
        let is_forage = f.feed_type == FeedType::Forage;
        let straw = is_forage && f.dm > 85.0;
        masks.straw.push(straw);
        masks.moist_forage.push(is_forage && f.dm < 80.0);
        masks
            .lqf
            .push(is_forage && f.cp < 7.0 && f.ndf > 72.0 && !straw);
        masks.wet_byprod.push(f.is_byproduct && f.dm < 30.0);
        masks.wet_other.push(!is_forage && f.dm < 21.0);
        masks.conc_all.push(!is_forage && !f.is_mineral);
        masks.urea.push(f.name.to_lowercase().contains("urea"));
        masks.mineral.push(f.is_mineral);
    }
    masks
}

impl From<&EnrichedFeed> for FeedRow {
    /// Project an enriched feed back to its raw form (derived fields drop out).
    fn from(f: &EnrichedFeed) -> FeedRow {
        FeedRow {
            name: f.name.clone(),
            feed_type: f.feed_type.clone(),
            category: f.category.clone(),
            price_per_kg_af: f.price_per_kg_af,
            dm: f.dm,
            ash: f.ash,
            cp: f.cp,
            npn_cp: f.npn_cp,
            ee: f.ee,
            cf: 0.0,
            nfe: 0.0,
            st: f.st,
            ndf: f.ndf,
            hemicellulose: 0.0,
            adf: f.adf,
            cellulose: 0.0,
            lg: f.lg,
            ndin: f.ndin,
            adin: f.adin,
            ca: f.ca,
            p: f.p,
            ac_ca: Some(f.ac_ca),
            ac_p: Some(f.ac_p),
            quantity_as_fed: f.quantity_as_fed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forage_row() -> FeedRow {
        FeedRow {
            name: "Corn silage".to_string(),
            feed_type: FeedType::Forage,
            category: "Grass/Silage".to_string(),
            price_per_kg_af: 0.05,
            dm: 33.0,
            ash: 4.3,
            cp: 8.8,
            npn_cp: 0.0,
            ee: 3.2,
            cf: 0.0,
            nfe: 0.0,
            st: 30.0,
            ndf: 45.0,
            hemicellulose: 0.0,
            adf: 28.0,
            cellulose: 0.0,
            lg: 2.9,
            ndin: 0.11,
            adin: 0.09,
            ca: 0.28,
            p: 0.26,
            ac_ca: None,
            ac_p: None,
            quantity_as_fed: None,
        }
    }

    fn mineral_row() -> FeedRow {
        FeedRow {
            name: "Mineral premix".to_string(),
            feed_type: FeedType::Concentrate,
            category: "Minerals".to_string(),
            price_per_kg_af: 1.2,
            dm: 98.0,
            ash: 90.0,
            cp: 0.0,
            npn_cp: 0.0,
            ee: 0.0,
            cf: 0.0,
            nfe: 0.0,
            st: 0.0,
            ndf: 0.0,
            hemicellulose: 0.0,
            adf: 0.0,
            cellulose: 0.0,
            lg: 0.0,
            ndin: 0.0,
            adin: 0.0,
            ca: 16.0,
            p: 8.0,
            ac_ca: None,
            ac_p: None,
            quantity_as_fed: None,
        }
    }

    #[test]
    fn test_forage_enrichment() {
        let feeds = enrich_feeds(&[forage_row()]).unwrap();
        let f = &feeds[0];
        assert_eq!(f.om, 100.0 - 4.3);
        assert!((f.ndfip - 0.11 * 6.25).abs() < 1e-12);
        assert!(f.de > 0.0 && f.de < 4.5);
        assert!((f.me - 0.82 * f.de).abs() < 1e-12);
        assert!((f.tdn - 100.0 * f.de / 4.4).abs() < 1e-12);
        assert!((f.nel - (0.0245 * f.tdn - 0.12)).abs() < 1e-12);
        // fa only counts extract above 1%
        assert!((f.fa - 2.2).abs() < 1e-12);
        assert_eq!(f.ac_ca, 0.4);
        assert_eq!(f.ac_p, 0.64);
        assert!((f.cost_per_dm_kg - 0.05 / 0.33).abs() < 1e-9);
        assert!(f.forage_ndf_kg > 0.0);
    }

    #[test]
    fn test_mineral_premix_rules() {
        let feeds = enrich_feeds(&[mineral_row()]).unwrap();
        let f = &feeds[0];
        // Concentrate + "Minerals" category retypes to Minerals
        assert_eq!(f.feed_type, FeedType::Minerals);
        assert!(f.is_mineral);
        assert_eq!(f.ge, 0.0);
        assert_eq!(f.de, 0.0);
        assert_eq!(f.me, 0.0);
        assert_eq!(f.tdn, 0.0);
        assert_eq!(f.nel, 0.0);
        assert_eq!(f.td_cp, 0.0);
        assert_eq!(f.ac_ca, 0.6);
        assert_eq!(f.ac_p, 0.7);
    }

    #[test]
    fn test_urea_additive_energy_discount() {
        let mut urea = mineral_row();
        urea.name = "Urea".to_string();
        urea.category = "Additive".to_string();
        urea.feed_type = FeedType::Additive;
        urea.ash = 0.0;
        urea.cp = 281.0;
        urea.npn_cp = 100.0;
        let feeds = enrich_feeds(&[urea]).unwrap();
        let f = &feeds[0];
        // NPN discount: 1 - 281*100/28200 ≈ 0.0035
        assert!(f.de < 0.05);
        assert_eq!(f.td_cp, 0.0);
    }

    #[test]
    fn test_empty_names_dropped() {
        let mut blank = forage_row();
        blank.name = "   ".to_string();
        let feeds = enrich_feeds(&[forage_row(), blank]).unwrap();
        assert_eq!(feeds.len(), 1);
    }

    #[test]
    fn test_category_masks() {
        let mut straw = forage_row();
        straw.name = "Wheat straw".to_string();
        straw.dm = 91.0;
        straw.cp = 3.5;
        straw.ndf = 78.0;
        let mut wet_byprod = forage_row();
        wet_byprod.name = "Brewers grains".to_string();
        wet_byprod.feed_type = FeedType::Concentrate;
        wet_byprod.category = "By-product".to_string();
        wet_byprod.dm = 24.0;
        let feeds = enrich_feeds(&[forage_row(), straw, wet_byprod, mineral_row()]).unwrap();
        let masks = detect_categories(&feeds);
        assert!(masks.has_moist_forage());
        assert!(masks.has_straw());
        assert!(masks.has_wet_byprod());
        assert!(masks.has_concentrate());
        assert!(!masks.has_urea());
        // straw over 85% DM never counts as low-quality fibrous
        assert!(!masks.lqf[1]);
        // minerals are excluded from the concentrate mass
        assert!(!masks.conc_all[3]);
    }

    #[test]
    fn test_enrichment_idempotent() {
        let first = enrich_feeds(&[forage_row(), mineral_row()]).unwrap();
        let back: Vec<FeedRow> = first.iter().map(FeedRow::from).collect();
        let second = enrich_feeds(&back).unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.feed_type, b.feed_type);
            assert!((a.de - b.de).abs() < 1e-12);
            assert!((a.nel - b.nel).abs() < 1e-12);
            assert!((a.td_cp - b.td_cp).abs() < 1e-12);
            assert!((a.ca_kg - b.ca_kg).abs() < 1e-12);
        }
    }
}
