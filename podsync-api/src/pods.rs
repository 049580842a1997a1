//! Pod records as seen by the coordinator, independent of any wire or storage shape.

use thiserror::Error;

/// Longest name the cluster accepts for a workload label value.
const MAX_NAME_LENGTH: usize = 63;

/// Port mapping owned by a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodPort {
    pub container_port: i32,
    pub host_port: Option<i32>,
    pub protocol: String,
}

/// Environment variable owned by a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEnv {
    pub key: String,
    pub value: String,
}

/// Desired state of a pod, before the metadata store has assigned it an id.
///
/// `ports` and `env` keep the order in which they were supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    pub team_id: i64,
    pub cpu_min: f32,
    pub cpu_max: f32,
    pub memory_min: f32,
    pub memory_max: f32,
    pub replicas: i32,
    pub ports: Vec<PodPort>,
    pub env: Vec<PodEnv>,
    pub pull_policy: String,
    pub restart_policy: String,
    pub pod_type: String,
    pub image: String,
}

/// A pod that has been persisted by the metadata store.
#[derive(Debug, Clone, PartialEq)]
pub struct Pod {
    pub id: i64,
    pub spec: PodSpec,
}

#[derive(Debug, Error, PartialEq)]
pub enum PodValidationError {
    #[error("The pod name cannot be empty")]
    EmptyName,

    #[error(
        "The pod name {0:?} must be at most 63 lowercase alphanumeric characters or '-', starting and ending with an alphanumeric character"
    )]
    InvalidName(String),

    #[error("The pod image cannot be empty")]
    EmptyImage,

    #[error("The {field} of the pod must be a finite, non-negative number, got {value}")]
    InvalidBound { field: &'static str, value: f32 },

    #[error("The cpu minimum {min} is greater than the cpu maximum {max}")]
    CpuBoundsInverted { min: f32, max: f32 },

    #[error("The memory minimum {min} is greater than the memory maximum {max}")]
    MemoryBoundsInverted { min: f32, max: f32 },

    #[error("The replica count cannot be negative, got {0}")]
    NegativeReplicas(i32),

    #[error("The port {0} is outside of the range 1-65535")]
    InvalidPort(i32),

    #[error("The pod name cannot be changed from {current:?} to {requested:?}")]
    NameChanged { current: String, requested: String },
}

impl PodSpec {
    /// Checks the invariants that must hold before either backend is written.
    pub fn validate(&self) -> Result<(), PodValidationError> {
        validate_name(&self.name)?;

        if self.image.trim().is_empty() {
            return Err(PodValidationError::EmptyImage);
        }

        for (field, value) in [
            ("cpu_min", self.cpu_min),
            ("cpu_max", self.cpu_max),
            ("memory_min", self.memory_min),
            ("memory_max", self.memory_max),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PodValidationError::InvalidBound { field, value });
            }
        }

        if self.cpu_min > self.cpu_max {
            return Err(PodValidationError::CpuBoundsInverted {
                min: self.cpu_min,
                max: self.cpu_max,
            });
        }
        if self.memory_min > self.memory_max {
            return Err(PodValidationError::MemoryBoundsInverted {
                min: self.memory_min,
                max: self.memory_max,
            });
        }

        if self.replicas < 0 {
            return Err(PodValidationError::NegativeReplicas(self.replicas));
        }

        for port in &self.ports {
            for value in std::iter::once(port.container_port).chain(port.host_port) {
                if !(1..=65535).contains(&value) {
                    return Err(PodValidationError::InvalidPort(value));
                }
            }
        }

        Ok(())
    }
}

/// Names double as cluster object names and label values, hence the DNS-1123 label rules.
fn validate_name(name: &str) -> Result<(), PodValidationError> {
    if name.is_empty() {
        return Err(PodValidationError::EmptyName);
    }

    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let valid = name.len() <= MAX_NAME_LENGTH
        && name.chars().all(|c| allowed(c) || c == '-')
        && name.starts_with(allowed)
        && name.ends_with(allowed);

    if !valid {
        return Err(PodValidationError::InvalidName(name.to_string()));
    }

    Ok(())
}
