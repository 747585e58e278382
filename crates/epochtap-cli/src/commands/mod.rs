pub mod config;
pub mod entity;
pub mod run;
pub mod tiers;
