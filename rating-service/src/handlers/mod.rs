//! HTTP handlers: the query/projection layer plus command endpoints.
//!
//! Handlers stay thin; GETs are pure reads against materialized state and
//! never rate or aggregate as a side effect.

pub mod calculations;
pub mod cost_models;
pub mod cycles;
pub mod forecasts;
pub mod usage;
