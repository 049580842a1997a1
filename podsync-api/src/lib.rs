//! Pod API service keeping workloads in a Kubernetes cluster and their records in Postgres
//! consistent.
//!
//! Every lifecycle command passes the resilience chain before the coordinator sequences the
//! cluster and metadata store writes.

pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod k8s;
pub mod metrics;
pub mod pods;
pub mod resilience;
pub mod routes;
pub mod span_builder;
pub mod startup;
