//! ServiceM8 Submission Sync Library
//!
//! Projects captured form submissions into ServiceM8: company, job, job
//! contact, lead-source badge and file attachments.
//!
//! # Modules
//!
//! - `attachments`: File store seam and per-file attachment upload.
//! - `badges`: Lead-source badge resolution and the shared badge cache.
//! - `company`: Company find-or-create with name-collision recovery.
//! - `config`: Environment configuration and two-tier settings resolution.
//! - `contact`: Job contact creation.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `job`: Job creation.
//! - `mapping`: Submission -> payload field mapping.
//! - `models`: Submission, payload and remote record models.
//! - `pipeline`: Orchestration of one submission end to end.
//! - `sm8_client`: ServiceM8 REST API client.

pub mod attachments;
pub mod badges;
pub mod company;
pub mod config;
pub mod contact;
pub mod errors;
pub mod handlers;
pub mod job;
pub mod mapping;
pub mod models;
pub mod pipeline;
pub mod sm8_client;
