//! REST API client module for the business endpoints.
//!
//! This module provides the `ApiClient`, a thin authenticated JSON caller.
//! Endpoint choice and response types are up to the caller; the session
//! manager hands in the live token for each call.

pub mod client;

pub use client::ApiClient;
