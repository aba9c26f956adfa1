//! Scenario tests driving the sync engine and enrichment worker against in-memory collaborators.

mod support;
