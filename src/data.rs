//! Feed catalog loading.
//!
//! A built-in demonstration catalog plus CSV ingestion accepting the
//! lab-export column names (`fd_name`, `fd_cp`, …) used by the feed
//! library spreadsheets.

use std::path::Path;

use serde::Deserialize;

use crate::nutrition::models::{FeedRow, FeedType};
use crate::utils::{RationError, Result};

pub struct FeedLibrary {
    pub rows: Vec<FeedRow>,
}

impl FeedLibrary {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn with_demo_catalog() -> Self {
        Self {
            rows: demo_catalog(),
        }
    }

    /// Load feed rows from a CSV export.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref()).map_err(|e| {
            RationError::InvalidInput(format!(
                "cannot open feed catalog {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let mut rows = Vec::new();
        for record in reader.deserialize::<CsvFeedRow>() {
            let raw =
                record.map_err(|e| RationError::InvalidInput(format!("bad feed row: {e}")))?;
            if raw.name.trim().is_empty() {
                continue;
            }
            rows.push(raw.into_feed_row());
        }
        Ok(Self { rows })
    }
}

impl Default for FeedLibrary {
    fn default() -> Self {
        Self::with_demo_catalog()
    }
}

fn parse_feed_type(s: &str) -> FeedType {
    match s.trim().to_lowercase().as_str() {
        "forage" => FeedType::Forage,
        "concentrate" => FeedType::Concentrate,
        "minerals" | "mineral" => FeedType::Minerals,
        "additive" => FeedType::Additive,
        "pasture" => FeedType::Pasture,
        _ => FeedType::Other,
    }
}

#[derive(Debug, Deserialize)]
struct CsvFeedRow {
    #[serde(alias = "fd_name")]
    name: String,
    #[serde(alias = "fd_type", alias = "type")]
    feed_type: String,
    #[serde(default, alias = "fd_category")]
    category: String,
    #[serde(default, alias = "fd_cost", alias = "price")]
    cost: f64,
    #[serde(default, alias = "fd_dm")]
    dm: f64,
    #[serde(default, alias = "fd_ash")]
    ash: f64,
    #[serde(default, alias = "fd_cp")]
    cp: f64,
    #[serde(default, alias = "fd_npn_cp")]
    npn_cp: f64,
    #[serde(default, alias = "fd_ee")]
    ee: f64,
    #[serde(default, alias = "fd_cf")]
    cf: f64,
    #[serde(default, alias = "fd_nfe")]
    nfe: f64,
    #[serde(default, alias = "fd_st")]
    st: f64,
    #[serde(default, alias = "fd_ndf")]
    ndf: f64,
    #[serde(default, alias = "fd_hemicellulose")]
    hemicellulose: f64,
    #[serde(default, alias = "fd_adf")]
    adf: f64,
    #[serde(default, alias = "fd_cellulose")]
    cellulose: f64,
    #[serde(default, alias = "fd_lg")]
    lg: f64,
    #[serde(default, alias = "fd_ndin")]
    ndin: f64,
    #[serde(default, alias = "fd_adin")]
    adin: f64,
    #[serde(default, alias = "fd_ca")]
    ca: f64,
    #[serde(default, alias = "fd_p")]
    p: f64,
    #[serde(default, alias = "fd_ac_ca")]
    ac_ca: Option<f64>,
    #[serde(default, alias = "fd_ac_p")]
    ac_p: Option<f64>,
    #[serde(default)]
    quantity_as_fed: Option<f64>,
}

impl CsvFeedRow {
    fn into_feed_row(self) -> FeedRow {
        FeedRow {
            name: self.name.trim().to_string(),
            feed_type: parse_feed_type(&self.feed_type),
            category: self.category,
            price_per_kg_af: self.cost,
            dm: self.dm,
            ash: self.ash,
            cp: self.cp,
            npn_cp: self.npn_cp,
            ee: self.ee,
            cf: self.cf,
            nfe: self.nfe,
            st: self.st,
            ndf: self.ndf,
            hemicellulose: self.hemicellulose,
            adf: self.adf,
            cellulose: self.cellulose,
            lg: self.lg,
            ndin: self.ndin,
            adin: self.adin,
            ca: self.ca,
            p: self.p,
            ac_ca: self.ac_ca,
            ac_p: self.ac_p,
            quantity_as_fed: self.quantity_as_fed,
        }
    }
}

fn row(
    name: &str,
    feed_type: FeedType,
    category: &str,
    cost: f64,
    dm: f64,
    ash: f64,
    cp: f64,
    ee: f64,
    st: f64,
    ndf: f64,
    adf: f64,
    lg: f64,
    ndin: f64,
    adin: f64,
    ca: f64,
    p: f64,
) -> FeedRow {
    FeedRow {
        name: name.to_string(),
        feed_type,
        category: category.to_string(),
        price_per_kg_af: cost,
        dm,
        ash,
        cp,
        npn_cp: 0.0,
        ee,
        cf: 0.0,
        nfe: 0.0,
        st,
        ndf,
        hemicellulose: 0.0,
        adf,
        cellulose: 0.0,
        lg,
        ndin,
        adin,
        ca,
        p,
        ac_ca: None,
        ac_p: None,
        quantity_as_fed: None,
    }
}

/// A compact, typical Holstein-herd catalog used by the demo binary and
/// the scenario tests. Composition values are book values (% of DM),
/// prices per as-fed kg.
pub fn demo_catalog() -> Vec<FeedRow> {
    vec![
        row(
            "Corn silage",
            FeedType::Forage,
            "Grass/Silage",
            0.05,
            33.0,
            4.3,
            8.8,
            3.2,
            30.0,
            45.0,
            28.0,
            2.9,
            0.11,
            0.09,
            0.28,
            0.26,
        ),
        row(
            "Alfalfa hay",
            FeedType::Forage,
            "Legume hay",
            0.20,
            88.0,
            10.0,
            19.0,
            2.3,
            2.0,
            42.0,
            32.0,
            7.0,
            0.30,
            0.20,
            1.40,
            0.26,
        ),
        row(
            "Wheat straw",
            FeedType::Forage,
            "Straw/Stover",
            0.03,
            91.0,
            7.5,
            3.5,
            1.4,
            0.5,
            78.0,
            52.0,
            8.5,
            0.20,
            0.15,
            0.30,
            0.08,
        ),
        row(
            "Corn grain",
            FeedType::Concentrate,
            "Cereal grain",
            0.25,
            88.0,
            1.5,
            9.4,
            4.2,
            72.0,
            9.5,
            3.4,
            1.1,
            0.08,
            0.04,
            0.04,
            0.30,
        ),
        row(
            "Soybean meal",
            FeedType::Concentrate,
            "Protein meal",
            0.45,
            89.0,
            6.6,
            48.0,
            1.6,
            6.0,
            14.0,
            9.0,
            0.9,
            0.25,
            0.10,
            0.35,
            0.70,
        ),
        row(
            "Wheat bran",
            FeedType::Concentrate,
            "Cereal by-product",
            0.15,
            89.0,
            5.8,
            16.5,
            4.0,
            22.0,
            42.5,
            13.5,
            3.7,
            0.15,
            0.08,
            0.13,
            1.00,
        ),
        row(
            "Mineral premix",
            FeedType::Minerals,
            "Minerals",
            1.20,
            98.0,
            90.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            16.0,
            8.0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_demo_catalog_is_enrichable() {
        let rows = demo_catalog();
        assert_eq!(rows.len(), 7);
        let enriched = crate::nutrition::feeds::enrich_feeds(&rows).unwrap();
        assert_eq!(enriched.len(), 7);
        // the catalog spans forage, concentrate, by-product and mineral classes
        let masks = crate::nutrition::feeds::detect_categories(&enriched);
        assert!(masks.has_straw());
        assert!(masks.has_moist_forage());
        assert!(masks.has_concentrate());
        assert!(masks.mineral.iter().any(|&m| m));
    }

    #[test]
    fn test_csv_round_trip() {
        let mut tmp = std::env::temp_dir();
        tmp.push("ration_engine_feed_test.csv");
        let mut file = std::fs::File::create(&tmp).unwrap();
        writeln!(
            file,
            "fd_name,fd_type,fd_category,fd_cost,fd_dm,fd_ash,fd_cp,fd_ee,fd_st,fd_ndf"
        )
        .unwrap();
        writeln!(file, "Corn silage,Forage,Grass/Silage,0.05,33,4.3,8.8,3.2,30,45").unwrap();
        writeln!(file, ",Forage,blank-name-should-drop,0,0,0,0,0,0,0").unwrap();
        let library = FeedLibrary::load_csv(&tmp).unwrap();
        std::fs::remove_file(&tmp).ok();
        assert_eq!(library.rows.len(), 1);
        assert_eq!(library.rows[0].name, "Corn silage");
        assert_eq!(library.rows[0].feed_type, FeedType::Forage);
        assert_eq!(library.rows[0].ndf, 45.0);
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(FeedLibrary::load_csv("/nonexistent/feeds.csv").is_err());
    }
}
