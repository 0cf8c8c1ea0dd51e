pub mod expect;
pub mod scenarios;
pub mod version;
