//! Integration tests for Kibble-Ingest
//!
//! These tests run the pipeline end to end against wiremock servers standing
//! in for the product API and the two catalog sites.

mod ingest_tests;
