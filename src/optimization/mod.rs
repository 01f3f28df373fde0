pub mod constants;
pub mod constraints;
pub mod nsga;
pub mod problem;
pub mod selection;
pub mod severity;
