//! # AT command host
//!
//! Terminates AT commands arriving on a serial line and translates them to socket operations
//! and Wi-Fi station control. Results and network events are reported back on the same line.
//!
//! Up to [config::MAX_LINKS] connections are multiplexed on the serial line. Outbound traffic is
//! serialized by two send pipelines, see [pipeline].
//!
//! The entry point is [gateway::Gateway].
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod commands;
pub mod config;
pub mod gateway;
pub mod net;
pub mod pipeline;
pub mod receiver;
pub mod registry;
pub mod transport;
pub mod urc;
pub mod wifi;

#[cfg(test)]
mod tests;
