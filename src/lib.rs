pub mod config;
pub mod consent;
pub mod dates;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod form_driver;
pub mod links;
pub mod locator;
pub mod model;
pub mod notice;
pub mod pipeline;
pub mod poll;
pub mod segment;
pub mod sequencer;
pub mod store;
pub mod text;
