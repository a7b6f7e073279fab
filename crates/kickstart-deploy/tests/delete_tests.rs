mod common;

use common::*;
use kickstart_deploy::{DeployConfig, KickstartError, PrerenderedDiagram};
use kickstart_repository::memory::InMemoryRepository;
use kickstart_repository::{DocumentRepository, RepositoryError};
use std::sync::Arc;

async fn deployed() -> InMemoryRepository {
    let repository = repository().await;
    let engine = Arc::new(ScriptedEngine::new());
    let service = service(&repository, &engine, config());

    let mut workflow = expense_workflow();
    let metadata = metadata(&workflow);
    service
        .deploy(&mut workflow, &metadata, &PrerenderedDiagram::new(png()))
        .await
        .unwrap();
    repository
}

#[tokio::test]
async fn test_delete_without_instances() {
    let repository = deployed().await;
    let engine = Arc::new(ScriptedEngine::new());
    let service = service(&repository, &engine, config());

    let report = service.delete("expense_approval").await.unwrap();

    assert_eq!(engine.instance_queries().len(), 1);
    assert!(engine.instance_deletes().is_empty());
    assert_eq!(report.drain_rounds, 0);
    assert_eq!(report.instances_deleted, 0);

    assert_eq!(
        report.removed,
        vec![
            definition("expense_approval.png"),
            definition("expense_approval.json"),
            definition("expense_approval-form-config.xml"),
            definition("expense_approval.bpmn20.xml"),
            model("expense_approval-task-model.xml"),
        ]
    );
    assert_eq!(report.missing, vec![definition("expense_approval_image.png")]);
    assert!(report.failed.is_empty());
    assert!(report.module_removed);
    assert!(report.is_complete());

    assert!(repository.document_names(DEFINITIONS).await.is_empty());
    assert!(repository.document_names(MODELS).await.is_empty());

    let calls = engine.calls();
    assert_eq!(
        calls.last(),
        Some(&HttpCall::Get(format!(
            "{}page/modules/module/delete?moduleId=kickstart_form_expense_approval",
            SHARE_URL
        )))
    );
}

#[tokio::test]
async fn test_delete_drains_instances_before_removing_artifacts() {
    let repository = deployed().await;
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_instances(120)
            .watching(repository.clone()),
    );
    let service = service(&repository, &engine, config());

    let report = service.delete("expense_approval").await.unwrap();

    assert_eq!(report.drain_rounds, 3);
    assert_eq!(report.instances_deleted, 120);
    assert!(report.instance_failures.is_empty());
    assert_eq!(engine.remaining_instances(), 0);

    let queries = engine.instance_queries();
    assert_eq!(queries.len(), 4);
    assert!(queries.iter().all(|url| url.contains("maxItems=50&skipCount=0")));
    assert!(queries
        .iter()
        .all(|url| url.contains("definitionName=activiti%24expense_approval")));

    let deletes = engine.instance_deletes();
    assert_eq!(deletes.len(), 120);
    assert!(deletes[0].ends_with("/api/workflow-instances/instance-1?forced=true"));

    // No repository document was touched while instances were being removed
    assert!(engine.repository_deletes_seen().iter().all(|seen| *seen == 0));
    assert_eq!(report.removed.len(), 5);
}

#[tokio::test]
async fn test_delete_gives_up_when_instances_keep_appearing() {
    let repository = deployed().await;
    let engine = Arc::new(ScriptedEngine::new().with_instances(2).stuck());
    let service = service(
        &repository,
        &engine,
        DeployConfig {
            max_drain_rounds: 3,
            ..config()
        },
    );

    let err = service.delete("expense_approval").await.unwrap_err();

    match err {
        KickstartError::DrainIncomplete {
            workflow_id,
            rounds,
            remaining,
        } => {
            assert_eq!(workflow_id, "expense_approval");
            assert_eq!(rounds, 3);
            assert_eq!(remaining, 2);
        }
        other => panic!("expected incomplete drain, got {:?}", other),
    }
    assert_eq!(engine.instance_queries().len(), 4);
    assert_eq!(repository.document_names(DEFINITIONS).await.len(), 4);
    assert_eq!(repository.document_names(MODELS).await.len(), 1);
}

#[tokio::test]
async fn test_delete_aborts_when_instance_query_fails() {
    let repository = deployed().await;
    let engine = Arc::new(ScriptedEngine::new().instance_query_status(500));
    let service = service(&repository, &engine, config());

    let err = service.delete("expense_approval").await.unwrap_err();

    assert!(matches!(
        err,
        KickstartError::Repository(RepositoryError::RemoteStatus { status: 500, .. })
    ));
    assert_eq!(repository.document_names(DEFINITIONS).await.len(), 4);
    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test]
async fn test_failed_instance_delete_is_retried_next_round() {
    let repository = deployed().await;
    let engine = Arc::new(ScriptedEngine::new().with_instances(3).failing_deletes(1));
    let service = service(&repository, &engine, config());

    let report = service.delete("expense_approval").await.unwrap();

    assert_eq!(report.drain_rounds, 2);
    assert_eq!(report.instances_deleted, 3);
    assert_eq!(report.instance_failures.len(), 1);
    assert_eq!(report.instance_failures[0].target, "instance-1");
    assert!(report.instance_failures[0].message.contains("500"));
    assert!(!report.is_complete());
    assert_eq!(report.removed.len(), 5);
}

#[tokio::test]
async fn test_delete_never_deployed_workflow() {
    let repository = repository().await;
    let engine = Arc::new(ScriptedEngine::new().module_delete_status(500));
    let service = service(&repository, &engine, config());

    let report = service.delete("ghost").await.unwrap();

    assert!(report.removed.is_empty());
    assert_eq!(report.missing.len(), 6);
    assert!(report.missing.contains(&model("ghost-task-model.xml")));
    assert!(!report.module_removed);
    assert!(report.module_error.as_deref().unwrap().contains("500"));
    assert!(!report.is_complete());
    assert!(repository.operations().await.is_empty());
}

#[tokio::test]
async fn test_traversal_ids_are_rejected_before_any_call() {
    let repository = deployed().await;
    repository.add_folder("/Sites").await;
    repository
        .create_document("/Sites", kickstart_repository::NewDocument::new("secret.png", "image/png", png()))
        .await
        .unwrap();
    let operations = repository.operations().await.len();
    let engine = Arc::new(ScriptedEngine::new());
    let service = service(&repository, &engine, config());

    for id in ["../../Sites/secret", "..", "a/b", "a\\b", ""] {
        let result = service.delete(id).await;
        assert!(matches!(result, Err(KickstartError::Validation(_))), "{:?} accepted", id);

        assert!(matches!(service.get(id, true).await, Err(KickstartError::Validation(_))));
        assert!(matches!(
            service.process_image(id).await,
            Err(KickstartError::Validation(_))
        ));
        assert!(matches!(
            service.set_process_image(id, png()).await,
            Err(KickstartError::Validation(_))
        ));
    }

    assert!(engine.calls().is_empty());
    assert_eq!(repository.operations().await.len(), operations);
    assert_eq!(repository.document_names("/Sites").await, vec!["secret.png".to_string()]);
    assert_eq!(repository.document_names(MODELS).await.len(), 1);
}

#[tokio::test]
async fn test_delete_with_engine_offline() {
    let repository = deployed().await;
    let engine = Arc::new(ScriptedEngine::new().offline());
    let service = service(&repository, &engine, config());

    let err = service.delete("expense_approval").await.unwrap_err();

    assert!(matches!(
        err,
        KickstartError::Repository(RepositoryError::BackendError(_))
    ));
    assert_eq!(repository.document_names(MODELS).await.len(), 1);
}

#[tokio::test]
async fn test_workflow_can_be_deployed_again_after_delete() {
    let repository = deployed().await;
    let engine = Arc::new(ScriptedEngine::new());
    let service = service(&repository, &engine, config());

    service.delete("expense_approval").await.unwrap();
    assert!(matches!(
        service.get("expense_approval", false).await,
        Err(KickstartError::NotFound(_))
    ));

    let mut workflow = expense_workflow();
    let metadata = metadata(&workflow);
    service
        .deploy(&mut workflow, &metadata, &PrerenderedDiagram::new(png()))
        .await
        .unwrap();
    assert_eq!(service.list(false).await.unwrap().len(), 1);
}
