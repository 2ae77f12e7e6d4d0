use mongo_provision::engine::codes;
use mongo_provision::memory::Operation;
use mongo_provision::{
    inspect, verify_admin_login, AdminUser, Connector, DatabaseConfiguration, EngineError,
    MemoryConnector, ProvisionError, ProvisionRequest, ProvisionStep, Provisioner, RoleGrant,
};
use mongodb::bson::doc;

fn setup() -> (MemoryConnector, Provisioner<MemoryConnector>) {
    let connector = MemoryConnector::default();
    let provisioner = Provisioner::new(connector.clone());
    (connector, provisioner)
}

#[tokio::test]
async fn test_server_fixture_end_to_end() {
    let (connector, provisioner) = setup();
    let db_config = DatabaseConfiguration::default();
    let req = ProvisionRequest::default();
    connector.seed_collection("test-server", "content", vec![doc! { "stale": true }]);

    provisioner.provision(&db_config, &req).await.unwrap();

    let report = provisioner.inspect(&db_config, &req).await.unwrap();
    assert_eq!(report.database, "test-server");
    assert_eq!(report.collections, vec!["test"]);
    assert_eq!(report.indexes, vec![doc! { "uid": 1 }]);
    assert_eq!(report.document_count(), 1);
    assert_eq!(
        report.documents[0].get_str("comment").unwrap(),
        "This is a test document"
    );
}

#[tokio::test]
async fn database_is_empty_before_collection_is_created() {
    let (connector, provisioner) = setup();
    let db_config = DatabaseConfiguration::default();
    let req = ProvisionRequest::default();
    connector.seed_collection("test-server", "content", vec![doc! { "stale": true }]);

    connector.fail_on(
        Operation::CreateCollection,
        EngineError::new(codes::NAMESPACE_EXISTS, "NamespaceExists", "Collection test-server.test already exists."),
    );
    let err = provisioner.provision(&db_config, &req).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Collection { step: ProvisionStep::CreateCollection, .. }));

    let report = provisioner.inspect(&db_config, &req).await.unwrap();
    assert!(report.collections.is_empty());
}

#[tokio::test]
async fn provisioning_twice_gives_the_same_state() {
    let (connector, provisioner) = setup();
    let db_config = DatabaseConfiguration::default();
    let req = ProvisionRequest::default();

    provisioner.provision(&db_config, &req).await.unwrap();
    let first = provisioner.inspect(&db_config, &req).await.unwrap();
    provisioner.provision(&db_config, &req).await.unwrap();
    let second = provisioner.inspect(&db_config, &req).await.unwrap();

    assert_eq!(first.collections, second.collections);
    assert_eq!(first.indexes, second.indexes);
    assert_eq!(first.document_count(), second.document_count());
    assert!(connector.has_user("test-server", "testadmin"));
    assert_eq!(
        verify_admin_login(&connector, &db_config, &req).await.unwrap(),
        vec![
            RoleGrant::new("dbAdmin", "test-server"),
            RoleGrant::new("readWrite", "test-server"),
        ]
    );
}

#[tokio::test]
async fn missing_user_does_not_fail_the_run() {
    let (connector, provisioner) = setup();
    assert!(!connector.has_user("test-server", "testadmin"));
    let summary = provisioner
        .provision(&DatabaseConfiguration::default(), &ProvisionRequest::default())
        .await
        .unwrap();
    assert!(!summary.user_replaced);
    assert!(!connector.journal().contains(&Operation::DropUser));
}

#[tokio::test]
async fn failed_drop_database_stops_before_user_steps() {
    let (connector, provisioner) = setup();
    connector.fail_on(
        Operation::DropDatabase,
        EngineError::new(codes::UNAUTHORIZED, "Unauthorized", "not authorized on test-server"),
    );

    let err = provisioner
        .provision(&DatabaseConfiguration::default(), &ProvisionRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Database { step: ProvisionStep::DropDatabase, .. }));
    assert!(err.to_string().starts_with("step `drop database` failed"));
    assert_eq!(connector.journal(), vec![Operation::Connect, Operation::DropDatabase]);
    assert!(!connector.has_user("test-server", "testadmin"));
}

#[tokio::test]
async fn failed_user_creation_stops_the_run() {
    let (connector, provisioner) = setup();
    let req = ProvisionRequest {
        user: AdminUser {
            roles: vec![],
            ..AdminUser::default()
        },
        ..ProvisionRequest::default()
    };

    let err = provisioner
        .provision(&DatabaseConfiguration::default(), &req)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::UserCreation { step: ProvisionStep::CreateUser, .. }));
    let journal = connector.journal();
    assert_eq!(journal.last(), Some(&Operation::CreateUser));
    assert!(!journal.contains(&Operation::CreateCollection));
    assert!(!journal.contains(&Operation::InsertDocument));
}

#[tokio::test]
async fn failed_index_stops_before_inserting() {
    let (connector, provisioner) = setup();
    connector.fail_on(
        Operation::CreateIndex,
        EngineError::new(codes::BAD_VALUE, "BadValue", "bad index"),
    );
    let err = provisioner
        .provision(&DatabaseConfiguration::default(), &ProvisionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Collection { step: ProvisionStep::CreateIndex, .. }));
    assert!(!connector.journal().contains(&Operation::InsertDocument));
}

#[tokio::test]
async fn rejected_seed_document_is_an_insert_error() {
    let (_connector, provisioner) = setup();
    let mut req = ProvisionRequest::default();
    req.collection.seed_documents.push(doc! { "$where": "1" });

    let err = provisioner
        .provision(&DatabaseConfiguration::default(), &req)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Insert { .. }));
    assert_eq!(err.engine_error().and_then(|e| e.code), Some(codes::BAD_VALUE));
}

#[tokio::test]
async fn bad_admin_credentials_are_a_connection_error() {
    let (connector, provisioner) = setup();
    let db_config = DatabaseConfiguration::default().with_credentials("root", "nope", "admin");
    let err = provisioner
        .provision(&db_config, &ProvisionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Connection { .. }));
    assert_eq!(connector.journal(), vec![Operation::Connect]);
}

#[tokio::test]
async fn admin_login_is_scoped_to_the_target_database() {
    let (connector, provisioner) = setup();
    let db_config = DatabaseConfiguration::default();
    let req = ProvisionRequest::default();
    provisioner.provision(&db_config, &req).await.unwrap();

    let roles = verify_admin_login(&connector, &db_config, &req).await.unwrap();
    assert!(roles.iter().all(|grant| grant.db == "test-server"));

    let login = db_config.with_credentials("testadmin", "password", "test-server");
    let elsewhere = connector.connect(&login, "other").await.unwrap();
    let err = inspect(&elsewhere, "test").await.unwrap_err();
    assert_eq!(err.code, Some(codes::UNAUTHORIZED));
}
