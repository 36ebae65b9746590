pub mod air365;
pub mod registry;
pub mod scheduled;
