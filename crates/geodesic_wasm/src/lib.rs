mod system;
pub mod simulation;

pub use system::{WasmGeodesic, WasmSimulation};
