pub mod assets;
pub mod reports;
pub mod runs;
pub mod seeds;

pub use assets::FileLoader;
pub use reports::RunReport;
pub use runs::{RunPlan, run_basin, run_compare};
pub use seeds::{resolve_seed_inputs, split_csv};
