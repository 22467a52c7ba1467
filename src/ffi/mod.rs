pub mod exports;
pub mod types;
