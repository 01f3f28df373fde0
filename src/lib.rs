pub mod analysis;
pub mod data;
pub mod engine;
pub mod nutrition;
pub mod optimization;
pub mod utils;

pub use analysis::models::{DietResult, MilkProjection};
pub use data::FeedLibrary;
pub use engine::{AssessmentRequest, Mode, RationEngine};
pub use nutrition::models::{
    AnimalInputs, AnimalState, Breed, EnergyBasis, FeedRow, FeedType, Requirements, Topography,
};
pub use optimization::nsga::RunConfig;
pub use optimization::selection::{Confidence, DietStatus};
pub use utils::{RationError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings() {
        assert_eq!(AnimalState::LactatingCow.to_string(), "Lactating Cow");
        assert_eq!(AnimalState::BabyCalf.to_string(), "Baby Calf/Heifer");
    }

    #[test]
    fn test_energy_basis_labels() {
        assert_eq!(EnergyBasis::NetEnergyLactation.to_string(), "NEL");
        assert_eq!(EnergyBasis::MetabolizableEnergy.to_string(), "ME");
    }

    #[test]
    fn test_default_config_matches_run_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.pop_size, 100);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.n_workers, 7);
        assert!((cfg.initial_epsilon - 3.0).abs() < 1e-12);
        assert!((cfg.final_epsilon - 0.05).abs() < 1e-12);
    }
}
