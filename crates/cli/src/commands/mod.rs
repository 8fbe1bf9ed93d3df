pub mod census;
pub mod migrate;
