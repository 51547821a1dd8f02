//! Core data models for the edital panel.
//!
//! `Document` maps to the `documents` table via `sqlx::FromRow`.

pub mod document;
