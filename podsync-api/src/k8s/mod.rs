//! Cluster backend integration.
//!
//! The coordinator depends only on the [`K8sClient`] trait. The default implementation,
//! [`http::HttpK8sClient`], runs each pod as a Kubernetes `Deployment` named after the pod and
//! talks to the API server through the [`kube`] crate using the ambient configuration
//! (in-cluster or `~/.kube/config`). Tests substitute scripted clients.

mod base;
pub mod http;

pub use base::*;
