//! oafinder - locate legal open-access copies of scholarly works.
//!
//! Landing pages are fetched through a redirect-aware client, classified
//! for PDF links, licenses and versions, and every candidate location for a
//! work is ranked into one open-access resolution. Repository pages are
//! scraped by a host-fair, rate-limited worker pool.

pub mod classify;
pub mod cli;
pub mod config;
pub mod http_client;
pub mod models;
pub mod pages;
pub mod priority;
pub mod producers;
pub mod rate_limit;
pub mod redirect;
pub mod repository;
pub mod resolve;
pub mod scheduler;
pub mod services;
pub mod utils;
pub mod work_queue;

#[cfg(test)]
mod test_support;
