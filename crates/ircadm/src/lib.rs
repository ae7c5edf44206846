//! ircadm - account provisioning and database reset for a self-hosted
//! Ergo IRC network.
//!
//! Account passwords live in Google Secret Manager; this tool turns them
//! into NickServ registrations over a privileged TLS session, and can tear
//! the account database down and rebuild it from scratch.

pub mod classify;
pub mod cli;
pub mod errors;
pub mod planner;
pub mod probe;
pub mod reset;
pub mod runner;
pub mod secrets;
pub mod services;
pub mod session;
pub mod tls;
