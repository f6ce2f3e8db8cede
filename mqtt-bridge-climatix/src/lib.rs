//! MQTT bridge for Siemens Climatix HMI controllers.
//!
//! The bridge scrapes the HMI web pages of a Climatix controller (as found
//! in Benekov boilers), publishes every value to MQTT, announces entities
//! through Home Assistant MQTT Discovery and writes commands back to the
//! controller.
//!
//! # Topics
//!
//! ```text
//! <base>/<host>/<page>/<key>/state        current value (retained)
//! <base>/<host>/<page>/<key>/attributes   item metadata JSON (retained)
//! <base>/<host>/<page>/<key>/set          commands for writable items
//! <base>/<host>/status                    online / offline
//! <prefix>/<component>/climatix_<host>/<page>_<key>/config
//! ```
//!
//! Where:
//! - `<base>` - `base_topic` from configuration (default `benekov`)
//! - `<host>` - slugified device host
//! - `<page>` - page id without `.cgi`, e.g. `HMI00001`
//! - `<key>` - item key, e.g. `o044`

pub mod classifier;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod hmi;
pub mod language;
pub mod model;
pub mod parser;
pub mod poller;
pub mod publisher;
pub mod registry;
