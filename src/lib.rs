//! Floor duty rotas.
//!
//! For each (floor, date) unit this crate narrows the roster to eligible
//! employees, builds a boolean constraint model of the day, solves it and
//! reads back one assignment per employee per hour: a task, a break, or
//! roaming.
//!
//! The pipeline is [`eligibility`] → [`model`] → [`engine`] → [`extract`],
//! driven per unit by [`planner`].

pub mod api;
pub mod config;
pub mod console;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod extract;
pub mod model;
pub mod planner;
pub mod store;
