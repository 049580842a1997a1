use podsync_api::db::pods::PgPodStore;
use podsync_api::db::{PodStore, PodsDbError};
use podsync_api::pods::{Pod, PodEnv};
use podsync_telemetry::tracing::init_test_tracing;

use crate::support::database::{
    create_podsync_api_database, drop_pg_database, test_database_config,
};
use crate::support::mocks::pod_spec;

mod support;

#[tokio::test(flavor = "multi_thread")]
async fn created_pod_reads_back_with_children_in_order() {
    init_test_tracing();
    // Arrange
    let config = test_database_config();
    let store = PgPodStore::new(create_podsync_api_database(&config).await);
    let spec = pod_spec("web-1");

    // Act
    let id = store.create_pod(&spec).await.unwrap();
    let by_id = store.read_pod(id).await.unwrap();
    let by_name = store.read_pod_by_name("web-1").await.unwrap();

    // Assert
    let expected = Pod { id, spec };
    assert_eq!(by_id.as_ref(), Some(&expected));
    assert_eq!(by_name, Some(expected));
    assert_eq!(store.read_pod(id + 1).await.unwrap(), None);
    assert_eq!(store.read_pod_by_name("web-2").await.unwrap(), None);

    drop_pg_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_name_is_reported_by_the_unique_constraint() {
    init_test_tracing();
    // Arrange
    let config = test_database_config();
    let store = PgPodStore::new(create_podsync_api_database(&config).await);
    store.create_pod(&pod_spec("web-1")).await.unwrap();

    // Act
    let result = store.create_pod(&pod_spec("web-1")).await;

    // Assert
    assert!(matches!(result, Err(PodsDbError::DuplicateName(name)) if name == "web-1"));
    assert_eq!(store.read_all_pods().await.unwrap().len(), 1);

    drop_pg_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn update_replaces_every_field_and_child() {
    init_test_tracing();
    // Arrange
    let config = test_database_config();
    let store = PgPodStore::new(create_podsync_api_database(&config).await);
    let id = store.create_pod(&pod_spec("web-1")).await.unwrap();
    let mut spec = pod_spec("web-1");
    spec.replicas = 4;
    spec.image = "nginx:1.27".to_string();
    spec.ports.truncate(1);
    spec.env = vec![PodEnv {
        key: "REGION".to_string(),
        value: "eu".to_string(),
    }];

    // Act
    let updated = store
        .update_pod(&Pod {
            id,
            spec: spec.clone(),
        })
        .await
        .unwrap();
    let missing = store
        .update_pod(&Pod {
            id: id + 1,
            spec: spec.clone(),
        })
        .await
        .unwrap();

    // Assert
    assert_eq!(updated, Some(id));
    assert_eq!(missing, None);
    assert_eq!(store.read_pod(id).await.unwrap(), Some(Pod { id, spec }));

    drop_pg_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn update_cannot_take_another_pods_name() {
    init_test_tracing();
    // Arrange
    let config = test_database_config();
    let store = PgPodStore::new(create_podsync_api_database(&config).await);
    store.create_pod(&pod_spec("web-1")).await.unwrap();
    let id = store.create_pod(&pod_spec("web-2")).await.unwrap();

    // Act
    let result = store
        .update_pod(&Pod {
            id,
            spec: pod_spec("web-1"),
        })
        .await;

    // Assert
    assert!(matches!(result, Err(PodsDbError::DuplicateName(_))));
    assert_eq!(
        store.read_pod(id).await.unwrap().unwrap().spec,
        pod_spec("web-2")
    );

    drop_pg_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_the_pod_and_its_children() {
    init_test_tracing();
    // Arrange
    let config = test_database_config();
    let pool = create_podsync_api_database(&config).await;
    let store = PgPodStore::new(pool.clone());
    let id = store.create_pod(&pod_spec("web-1")).await.unwrap();

    // Act
    let deleted = store.delete_pod(id).await.unwrap();
    let deleted_again = store.delete_pod(id).await.unwrap();

    // Assert
    assert_eq!(deleted, Some(id));
    assert_eq!(deleted_again, None);
    assert_eq!(store.read_pod(id).await.unwrap(), None);
    let (ports,): (i64,) = sqlx::query_as("select count(*) from app.pod_ports")
        .fetch_one(&pool)
        .await
        .unwrap();
    let (envs,): (i64,) = sqlx::query_as("select count(*) from app.pod_envs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!((ports, envs), (0, 0));

    drop_pg_database(&config).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn all_pods_are_read_in_id_order_with_their_own_children() {
    init_test_tracing();
    // Arrange
    let config = test_database_config();
    let store = PgPodStore::new(create_podsync_api_database(&config).await);
    let first = store.create_pod(&pod_spec("web-1")).await.unwrap();
    let mut second_spec = pod_spec("web-2");
    second_spec.ports.clear();
    second_spec.env.reverse();
    let second = store.create_pod(&second_spec).await.unwrap();

    // Act
    let pods = store.read_all_pods().await.unwrap();

    // Assert
    assert_eq!(
        pods,
        vec![
            Pod {
                id: first,
                spec: pod_spec("web-1"),
            },
            Pod {
                id: second,
                spec: second_spec,
            },
        ]
    );

    drop_pg_database(&config).await;
}
