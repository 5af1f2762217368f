//! Backend for the Electivas ITBA review site: anonymous like/dislike votes
//! and comments on elective subjects, moderated with weak identity signals
//! (browser fingerprint, vote cookie, client IP) over a shared key-value
//! store.

pub mod analytics;
pub mod api;
pub mod blocklist;
pub mod bootstrap;
pub mod catalog;
pub mod cli;
pub mod comments;
pub mod config;
pub mod error;
pub mod identity;
pub mod keys;
pub mod ratelimit;
pub mod reports;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod votes;
