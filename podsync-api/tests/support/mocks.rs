#![allow(dead_code)]

use podsync_api::pods::{PodEnv, PodPort, PodSpec};
use podsync_api::routes::pods::{PodEnvInfo, PodInfo, PodPortInfo};

/// Returns the spec of a two replica nginx pod named `name`.
pub fn pod_spec(name: &str) -> PodSpec {
    PodSpec {
        name: name.to_string(),
        namespace: "default".to_string(),
        team_id: 7,
        cpu_min: 0.1,
        cpu_max: 0.5,
        memory_min: 128.0,
        memory_max: 256.0,
        replicas: 2,
        ports: vec![
            PodPort {
                container_port: 80,
                host_port: Some(8080),
                protocol: "TCP".to_string(),
            },
            PodPort {
                container_port: 443,
                host_port: None,
                protocol: "TCP".to_string(),
            },
        ],
        env: vec![
            PodEnv {
                key: "MODE".to_string(),
                value: "prod".to_string(),
            },
            PodEnv {
                key: "LOG_LEVEL".to_string(),
                value: "info".to_string(),
            },
        ],
        pull_policy: "IfNotPresent".to_string(),
        restart_policy: "Always".to_string(),
        pod_type: "web".to_string(),
        image: "nginx".to_string(),
    }
}

/// Returns the wire form of [`pod_spec`].
pub fn pod_info(name: &str) -> PodInfo {
    let spec = pod_spec(name);

    PodInfo {
        id: 0,
        name: spec.name,
        namespace: spec.namespace,
        team_id: spec.team_id,
        cpu_min: spec.cpu_min,
        cpu_max: spec.cpu_max,
        memory_min: spec.memory_min,
        memory_max: spec.memory_max,
        replicas: spec.replicas,
        ports: spec
            .ports
            .into_iter()
            .map(|port| PodPortInfo {
                container_port: port.container_port,
                host_port: port.host_port,
                protocol: port.protocol,
            })
            .collect(),
        env: spec
            .env
            .into_iter()
            .map(|env| PodEnvInfo {
                key: env.key,
                value: env.value,
            })
            .collect(),
        pull_policy: spec.pull_policy,
        restart_policy: spec.restart_policy,
        pod_type: spec.pod_type,
        image: spec.image,
    }
}
