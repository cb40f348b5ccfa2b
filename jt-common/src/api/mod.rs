//! API helpers shared by JobTrack HTTP services

pub mod auth;
