//! Launcher and updater for the Linux Discord client.
//!
//! The binaries (`discord-launcher`, `discord-launcher-gui`) only parse
//! arguments and report results; everything else lives here, driven through
//! [`launcher::Launcher`].

#[cfg(not(unix))]
compile_error!("discord-launcher only supports Unix-like systems");

pub mod channel;
pub mod cli;
pub mod config;
pub mod desktop;
pub mod error;
#[cfg(feature = "gui")]
pub mod gui;
pub mod install;
pub mod launcher;
pub mod logging;
pub mod process;
pub mod update;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;
