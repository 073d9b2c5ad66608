//! Asynchronous chest X-ray classification service.
//!
//! Images are submitted over HTTP and classified asynchronously: the
//! submission path fingerprints and deduplicates the payload, records a job
//! in Postgres, and pushes the id onto a Redis queue; a pool of worker
//! processes drains the queue in micro-batches, runs the ONNX classifier,
//! and persists per-pathology scores. Clients poll for completion.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod sweeper;
pub mod worker;
