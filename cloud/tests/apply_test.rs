pub(crate) mod mock;

use maplit::btreemap;
use mock::{MockCloud, ENDPOINT, KUBE_SYSTEM_UID, PROVIDER};
use pharmer_cloud::provider::CloudRegistry;
use pharmer_cloud::{
    apply, certificates, create_cluster, create_machine_sets, delete_cluster, delete_machine_set,
    get_kube_config, scale_machine_set, Scope,
};
use pharmer_model::constants::{ADMIN_CERT_NAME, CA_CERT_NAME, ETCD_CA_CERT_NAME};
use pharmer_model::{ActionType, AuthInfo, Cluster, ClusterPhase, Credential, OperationCode};
use pharmer_store::{fake, DynStore};
use std::sync::Arc;

const CLUSTER: &str = "pharmer-test";
const SKU: &str = "n1-standard-2";
const POOL: &str = "n1-standard-2-pool";

async fn setup() -> (DynStore, MockCloud, CloudRegistry) {
    let store: DynStore = Arc::new(fake::new());
    let mut credential = Credential::new("mock-cred", "DigitalOcean");
    credential
        .spec
        .data
        .insert("token".to_string(), "secret".to_string());
    store.credentials().create(credential).await.unwrap();
    let cloud = MockCloud::default();
    let registry = cloud.registry();
    (store, cloud, registry)
}

fn new_cluster() -> Cluster {
    let mut cluster = Cluster::new(CLUSTER);
    cluster.spec.config.cloud.cloud_provider = PROVIDER.to_string();
    cluster.spec.config.credential_name = "mock-cred".to_string();
    cluster.spec.config.kubernetes_version = "1.24.0".to_string();
    cluster
}

async fn load_scope(store: &DynStore) -> Scope {
    let cluster = store.clusters().get(CLUSTER).await.unwrap();
    Scope::new(cluster, store.clone())
}

async fn apply_once(store: &DynStore, registry: &CloudRegistry, dry_run: bool) -> Scope {
    let mut scope = load_scope(store).await;
    let mut manager = registry.manager(PROVIDER).unwrap();
    apply(&mut scope, manager.as_mut(), dry_run).await.unwrap();
    scope
}

#[tokio::test]
async fn create_sets_defaults_and_certificates() {
    let (store, _cloud, registry) = setup().await;
    let cluster = create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    assert_eq!(cluster.status.phase, ClusterPhase::Pending);
    assert_eq!(cluster.spec.config.ca_cert_name, CA_CERT_NAME);
    assert_eq!(cluster.spec.config.cloud.zone, "mock-1a");
    assert_eq!(cluster.spec.config.cloud.network_provider, "calico");
    assert_eq!(cluster.pod_cidr(), Some("192.168.0.0/16"));
    assert!(!cluster.metadata.uid.is_empty());

    let certs = store.certificates(CLUSTER);
    certs.get(CA_CERT_NAME).await.unwrap();
    certs.get(ETCD_CA_CERT_NAME).await.unwrap();
    assert!(certs.get(ADMIN_CERT_NAME).await.unwrap_err().is_not_found());
    let ssh = store
        .ssh_keys(CLUSTER)
        .get(&cluster.spec.config.cloud.ssh_key_name)
        .await
        .unwrap();
    assert!(ssh.public.starts_with(b"ssh-rsa "));

    certificates::get_pharmer_certs(store.as_ref(), &cluster)
        .await
        .unwrap();
    let admin = certificates::get_admin_cert(store.as_ref(), &cluster)
        .await
        .unwrap();
    let again = certificates::get_admin_cert(store.as_ref(), &cluster)
        .await
        .unwrap();
    assert_eq!(admin.cert.to_der().unwrap(), again.cert.to_der().unwrap());
}

#[tokio::test]
async fn cloud_issued_ca_cannot_sign_admin_cert() {
    let (store, _cloud, registry) = setup().await;
    let cluster = create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    let cloud_ca = certificates::create_ca_cert_pair("cloud-ca").unwrap();
    certificates::store_cloud_ca(store.as_ref(), &cluster, cloud_ca.cert_pem().unwrap())
        .await
        .unwrap();

    let err = match certificates::get_admin_cert(store.as_ref(), &cluster).await {
        Ok(_) => panic!("admin certificate issued from a foreign CA"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("cloud provider"), "{}", err);
    assert!(store
        .certificates(CLUSTER)
        .get(ADMIN_CERT_NAME)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn create_rejects_bad_clusters() {
    let (store, _cloud, registry) = setup().await;
    create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();

    let err = create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"), "{}", err);

    let mut unknown = new_cluster();
    unknown.metadata.name = "other".to_string();
    unknown.spec.config.cloud.cloud_provider = "linode".to_string();
    let err = create_cluster(store.as_ref(), &registry, unknown)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("linode"), "{}", err);
    assert!(store.clusters().get("other").await.is_err());

    let err = create_cluster(store.as_ref(), &registry, Cluster::new(""))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("name"), "{}", err);
}

#[tokio::test]
async fn cluster_lifecycle() {
    let (store, cloud, registry) = setup().await;
    let cluster = create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    let manager = registry.manager(PROVIDER).unwrap();
    let nodes = btreemap! { SKU.to_string() => 2, "n1-standard-4".to_string() => 1 };
    let created = create_machine_sets(store.as_ref(), manager.as_ref(), &cluster, &nodes)
        .await
        .unwrap();
    assert_eq!(created.len(), 2);

    // pending: the cluster and both pools are created
    let scope = apply_once(&store, &registry, false).await;
    assert_eq!(scope.cluster.status.phase, ClusterPhase::Ready);
    assert_eq!(scope.cluster.metadata.uid, KUBE_SYSTEM_UID);
    assert_eq!(scope.cluster.api_server_url().unwrap(), format!("https://{}", ENDPOINT));
    {
        let state = cloud.state();
        assert!(state.cluster_exists);
        assert_eq!(state.pools.get(POOL), Some(&2));
        assert_eq!(state.pools.get("n1-standard-4-pool"), Some(&1));
    }
    let stored = store.machine_sets(CLUSTER).get(POOL).await.unwrap();
    assert_eq!(stored.status.replicas, 2);
    let operation = store.operations().get(1).await.unwrap();
    assert_eq!(operation.code, OperationCode::Done);
    assert_eq!(operation.cluster_id, CLUSTER);

    let konfig = get_kube_config(&scope, manager.as_ref()).await.unwrap();
    assert_eq!(konfig.context.name, "cluster-admin@pharmer-test.pharmer");
    assert!(matches!(konfig.auth_info.auth, AuthInfo::Token { .. }));

    // ready: resize one pool and remove the other
    scale_machine_set(store.as_ref(), CLUSTER, POOL, 5)
        .await
        .unwrap();
    delete_machine_set(store.as_ref(), CLUSTER, "n1-standard-4-pool")
        .await
        .unwrap();
    apply_once(&store, &registry, false).await;
    {
        let state = cloud.state();
        assert_eq!(state.pools.get(POOL), Some(&5));
        assert!(!state.pools.contains_key("n1-standard-4-pool"));
    }
    assert!(store
        .machine_sets(CLUSTER)
        .get("n1-standard-4-pool")
        .await
        .unwrap_err()
        .is_not_found());

    // deletion: pools go first, then the cluster
    let deleted = delete_cluster(store.as_ref(), CLUSTER).await.unwrap();
    assert_eq!(deleted.status.phase, ClusterPhase::Deleting);
    let scope = apply_once(&store, &registry, false).await;
    assert_eq!(scope.cluster.status.phase, ClusterPhase::Deleted);
    {
        let state = cloud.state();
        assert!(!state.cluster_exists);
        assert!(state.pools.is_empty());
    }
    assert!(store.machine_sets(CLUSTER).list().await.unwrap().is_empty());

    // deleted: nothing left to do
    let connected = cloud.state().connected;
    apply_once(&store, &registry, false).await;
    assert_eq!(cloud.state().connected, connected);
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let (store, cloud, registry) = setup().await;
    let cluster = create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    let manager = registry.manager(PROVIDER).unwrap();
    create_machine_sets(
        store.as_ref(),
        manager.as_ref(),
        &cluster,
        &btreemap! { SKU.to_string() => 3 },
    )
    .await
    .unwrap();

    let mut scope = load_scope(&store).await;
    let mut manager = registry.manager(PROVIDER).unwrap();
    let actions = apply(&mut scope, manager.as_mut(), true).await.unwrap();
    let kinds: Vec<ActionType> = actions.iter().map(|a| a.action).collect();
    assert_eq!(kinds, vec![ActionType::Add, ActionType::Add]);

    assert!(!cloud.state().cluster_exists);
    assert!(cloud.state().pools.is_empty());
    let stored = store.clusters().get(CLUSTER).await.unwrap();
    assert_eq!(stored.status.phase, ClusterPhase::Pending);
    assert!(store.operations().get(1).await.is_err());
}

#[tokio::test]
async fn failure_is_recorded() {
    let (store, cloud, registry) = setup().await;
    create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    cloud.state().fail_prepare = true;

    let mut scope = load_scope(&store).await;
    let mut manager = registry.manager(PROVIDER).unwrap();
    let err = apply(&mut scope, manager.as_mut(), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Quota exceeded"), "{}", err);

    let stored = store.clusters().get(CLUSTER).await.unwrap();
    assert_eq!(stored.status.phase, ClusterPhase::Pending);
    assert!(stored.status.reason.contains("Quota exceeded"));
    let operation = store.operations().get(1).await.unwrap();
    assert_eq!(operation.code, OperationCode::Failed);

    // the next successful apply clears the reason
    cloud.state().fail_prepare = false;
    let scope = apply_once(&store, &registry, false).await;
    assert_eq!(scope.cluster.status.phase, ClusterPhase::Ready);
    assert!(scope.cluster.status.reason.is_empty());
}

#[tokio::test]
async fn delete_survives_node_group_failure() {
    let (store, cloud, registry) = setup().await;
    create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    apply_once(&store, &registry, false).await;
    cloud.state().fail_scale = true;

    delete_cluster(store.as_ref(), CLUSTER).await.unwrap();
    let scope = apply_once(&store, &registry, false).await;
    assert_eq!(scope.cluster.status.phase, ClusterPhase::Deleted);
    assert!(!cloud.state().cluster_exists);
}

#[tokio::test]
async fn half_created_cluster_is_removed_from_the_cloud() {
    let (store, cloud, registry) = setup().await;
    create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    {
        // the create call went through but waiting for it failed
        let mut state = cloud.state();
        state.cluster_exists = true;
        state.fail_prepare = true;
    }
    let mut scope = load_scope(&store).await;
    let mut manager = registry.manager(PROVIDER).unwrap();
    apply(&mut scope, manager.as_mut(), false)
        .await
        .unwrap_err();
    let stored = store.clusters().get(CLUSTER).await.unwrap();
    assert_eq!(stored.status.phase, ClusterPhase::Pending);

    let deleted = delete_cluster(store.as_ref(), CLUSTER).await.unwrap();
    assert_eq!(deleted.status.phase, ClusterPhase::Deleting);
    assert!(deleted.is_deleting());

    let scope = apply_once(&store, &registry, false).await;
    assert_eq!(scope.cluster.status.phase, ClusterPhase::Deleted);
    assert!(!cloud.state().cluster_exists);
}

#[tokio::test]
async fn never_applied_cluster_is_deleted() {
    let (store, cloud, registry) = setup().await;
    create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    delete_cluster(store.as_ref(), CLUSTER).await.unwrap();

    let actions = {
        let mut scope = load_scope(&store).await;
        let mut manager = registry.manager(PROVIDER).unwrap();
        apply(&mut scope, manager.as_mut(), false).await.unwrap()
    };
    assert!(actions.is_empty());
    assert!(!cloud.state().cluster_exists);
    let stored = store.clusters().get(CLUSTER).await.unwrap();
    assert_eq!(stored.status.phase, ClusterPhase::Deleted);
}

#[tokio::test]
async fn unsupported_phases_are_refused() {
    let (store, cloud, registry) = setup().await;
    let mut cluster = new_cluster();
    cluster.status.phase = ClusterPhase::Unknown;
    store.clusters().create(cluster).await.unwrap();
    let mut manager = registry.manager(PROVIDER).unwrap();

    let mut scope = load_scope(&store).await;
    let err = apply(&mut scope, manager.as_mut(), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no known phase"), "{}", err);

    let mut scope = load_scope(&store).await;
    scope.cluster.status.phase = ClusterPhase::Upgrading;
    let err = apply(&mut scope, manager.as_mut(), true)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("upgrade"), "{}", err);
    assert_eq!(cloud.state().connected, 0);
}

#[tokio::test]
async fn missing_node_group() {
    let (store, _cloud, registry) = setup().await;
    create_cluster(store.as_ref(), &registry, new_cluster())
        .await
        .unwrap();
    let err = scale_machine_set(store.as_ref(), CLUSTER, "nope-pool", 1)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nope-pool"), "{}", err);
}
