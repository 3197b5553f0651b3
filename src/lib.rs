pub mod acquisition;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod report;
pub mod scan;
pub mod source;
pub mod stats;
pub mod store;
pub mod stratum;
pub mod util;
