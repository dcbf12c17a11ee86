//! WASM bindings for the vacuum stability engine.

mod stability;

pub use stability::WasmVacuumStability;
