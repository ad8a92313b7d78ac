//! Keystone - website backend for a structural-engineering consultancy
//!
//! This library provides the public content API, the contact endpoint and
//! the session-gated admin panel over the hosted data store.

pub mod api;
pub mod config;
pub mod models;
pub mod remote;
pub mod services;
