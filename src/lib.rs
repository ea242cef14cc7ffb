//! podflow - containerized batch workflow definitions
//!
//! podflow describes scheduled batch pipelines whose steps each run as a
//! Kubernetes pod. A definition is declarative: an external orchestrator
//! owns the scheduler loop and the cluster, while podflow validates the
//! definition, computes its schedule, renders the pod manifests and evaluates
//! a run against the orchestrator's retry and dependency rules.
//!
//! ## Example
//!
//! ```yaml
//! name: flight_full_pipeline
//! schedule: "0 6,18 * * *"
//! start_date:
//!   days_ago: 1
//! catchup: false
//! default_args:
//!   retries: 1
//!
//! steps:
//!   - id: ingestion_job
//!     name: ingestion-worker
//!     namespace: bigdata
//!     image: flight-prediction:v2
//!     command: [python, -m, src.jobs.ingestion_job]
//!     on_finish: delete_pod
//!
//!   - id: etl_job
//!     name: etl-worker
//!     namespace: bigdata
//!     image: flight-prediction:v2
//!     command: [python, -m, src.jobs.etl_job]
//!     on_finish: keep_pod
//!
//! edges:
//!   - upstream: ingestion_job
//!     downstream: etl_job
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod render;
pub mod telemetry;
pub mod templates;
pub mod workflow;

pub use error::{Error, Result};
