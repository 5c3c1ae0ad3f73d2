//! sd-bot - announces GitHub activity on IRC and takes admin commands from
//! NickServ-identified users.
//!
//! The pieces, roughly in the order data flows through them:
//!
//! - [`network`] keeps one reconnecting IRC link and hands out [`network::Client`]s
//! - [`identity`] maps nicknames to NickServ accounts
//! - [`admin`] runs `.addadmin`, `.deladmin` and `.raw` for trusted accounts
//! - [`http`] and [`github`] turn webhook deliveries into channel lines
//! - [`persist`] stores the admin set across restarts

pub mod admin;
pub mod config;
pub mod error;
pub mod github;
pub mod http;
pub mod identity;
pub mod network;
pub mod persist;
