//! Ingestion entry points: population pull and the combined sync trigger

mod population;
mod trigger;

pub use population::{population_key, pull_population};
pub use trigger::{run_trigger, TriggerBody, TriggerContext, TriggerRequest, TriggerResponse};
