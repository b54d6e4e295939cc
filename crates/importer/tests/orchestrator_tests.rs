//! End-to-end pipeline runs with a fake converter and inspector.

mod common;

use async_trait::async_trait;
use common::{TestPipeline, layer, staged_upload};
use geoingest_core::{
    ExecutionAction, ExecutionId, ExecutionStatus, HandlerKind, IMPORT_TASKS, ImportOptions,
    ImportStage, PipelineStep, ResourceOverrides, UploadFiles,
};
use geoingest_importer::{
    ExecutionInput, ImportError, ImportHandler, ImportResult, StepContext, VectorPipeline,
};
use geoingest_metadata::models::ExecutionRow;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

/// Handler whose steps only record that they ran.
struct ScriptedHandler {
    pipeline: Arc<VectorPipeline>,
    executed: Arc<Mutex<Vec<PipelineStep>>>,
    fail_at: Option<PipelineStep>,
    panic_at: Option<PipelineStep>,
}

#[async_trait]
impl ImportHandler for ScriptedHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::GeoPackage
    }

    fn is_valid(&self, _files: &UploadFiles) -> bool {
        true
    }

    fn source_uri(&self, _files: &UploadFiles) -> ImportResult<String> {
        Ok("scripted".to_string())
    }

    fn pipeline(&self) -> &VectorPipeline {
        &self.pipeline
    }

    async fn execute_step(&self, step: PipelineStep, ctx: &mut StepContext) -> ImportResult<()> {
        self.executed.lock().unwrap().push(step);
        if self.panic_at == Some(step) {
            panic!("boom at {step}");
        }
        if self.fail_at == Some(step) {
            return Err(ImportError::UnexpectedLayerStructure(format!(
                "{step} exploded"
            )));
        }
        ctx.output.layers.push(step.as_str().to_string());
        Ok(())
    }
}

async fn scripted(
    fail_at: Option<PipelineStep>,
    panic_at: Option<PipelineStep>,
) -> (TestPipeline, Arc<Mutex<Vec<PipelineStep>>>) {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let recorder = executed.clone();
    let harness = TestPipeline::with_handlers(move |pipeline| {
        vec![Arc::new(ScriptedHandler {
            pipeline,
            executed: recorder,
            fail_at,
            panic_at,
        }) as Arc<dyn ImportHandler>]
    })
    .await;
    (harness, executed)
}

async fn dispatch_scripted(harness: &TestPipeline) -> ExecutionId {
    let handler = harness.registry.get(HandlerKind::GeoPackage).unwrap();
    harness
        .orchestrator
        .dispatch(
            handler.as_ref(),
            UploadFiles::new(),
            ImportOptions::default(),
            None,
        )
        .await
        .unwrap()
}

/// Import a staged GeoPackage through the resolved handler.
async fn import_gpkg(harness: &TestPipeline, store_spatial_files: bool) -> (ExecutionId, std::path::PathBuf) {
    let (files, upload_dir) = staged_upload(harness.dir.path(), "stili.gpkg");
    let handler = harness.registry.resolve(&files).expect("gpkg handler");
    assert_eq!(handler.kind(), HandlerKind::GeoPackage);
    let id = harness
        .orchestrator
        .dispatch(
            handler.as_ref(),
            files,
            ImportOptions {
                store_spatial_files,
            },
            Some(upload_dir.clone()),
        )
        .await
        .unwrap();
    (id, upload_dir)
}

#[tokio::test]
async fn test_import_runs_every_stage() {
    let harness = TestPipeline::new().await;
    let (id, upload_dir) = import_gpkg(&harness, false).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "success", "log:\n{}", row.log);
    assert_eq!(row.stage, ImportStage::Registered.as_str());

    let lines: Vec<_> = row.log.lines().collect();
    let expected = [
        "import execution accepted",
        "starting start_import",
        "starting import_resource",
        "setting up dynamic model for layer Stili_Di_Vita",
        "importing 1 layer(s) into the datastore",
        "starting publish_resource",
        "starting create_resource",
        "import finished",
    ];
    assert_eq!(lines, expected);

    let resources = harness
        .store
        .get_resources_for_execution(*id.as_uuid())
        .await
        .unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].name, "stili_di_vita");
    assert_eq!(resources[0].table_name, "datastore.stili_di_vita");
    assert_eq!(resources[0].geometry_type.as_deref(), Some("multi_polygon"));
    assert!(resources[0].files_json.is_none());

    let info = harness
        .store
        .get_handler_info(resources[0].resource_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.handler_key, HandlerKind::GeoPackage.key());

    let output: serde_json::Value =
        serde_json::from_str(row.output_json.as_deref().unwrap()).unwrap();
    assert_eq!(output["layers"], serde_json::json!(["stili_di_vita"]));
    assert_eq!(
        output["resources"],
        serde_json::json!([resources[0].resource_id])
    );

    assert!(!upload_dir.exists(), "staged files should be removed");

    let calls = harness.runner.calls();
    assert_eq!(calls.len(), 1);
    let args: Vec<_> = calls[0].arg_values().collect();
    assert!(args.iter().any(|a| a.ends_with("stili.gpkg")));
    assert!(args.contains(&"-overwrite"));
    assert!(!calls[0].to_string().contains("secret"));
    assert_eq!(harness.inspector.sources().len(), 1);
}

#[tokio::test]
async fn test_store_spatial_files_keeps_upload() {
    let harness = TestPipeline::new().await;
    let (id, upload_dir) = import_gpkg(&harness, true).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "success", "log:\n{}", row.log);
    assert!(upload_dir.exists());

    let resources = harness
        .store
        .get_resources_for_execution(*id.as_uuid())
        .await
        .unwrap();
    let files: UploadFiles =
        serde_json::from_str(resources[0].files_json.as_deref().unwrap()).unwrap();
    assert!(files.base_file().unwrap().ends_with("stili.gpkg"));
}

#[tokio::test]
async fn test_converter_failure_is_recorded() {
    let harness = TestPipeline::new().await;
    harness.runner.fail_with(1, "ERROR 1: connection refused");
    let (id, upload_dir) = import_gpkg(&harness, false).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.stage, "failed");
    assert!(
        row.log.ends_with(
            "import_resource failed: ogr2ogr failed (exit code Some(1)): ERROR 1: connection refused\n"
        ),
        "log:\n{}",
        row.log
    );
    assert!(
        harness
            .store
            .get_resources_for_execution(*id.as_uuid())
            .await
            .unwrap()
            .is_empty()
    );
    // Cleanup only happens on successful registration.
    assert!(upload_dir.exists());
}

#[tokio::test]
async fn test_unmapped_type_fails_before_conversion() {
    let harness = TestPipeline::new().await;
    harness.inspector.set_layers(vec![layer(
        "odd",
        &[("shape_blob", "Unobtainium")],
        Some("Point"),
    )]);
    let (id, _) = import_gpkg(&harness, false).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "failed");
    assert!(row.log.contains("unmapped field type 'Unobtainium'"));
    assert!(harness.store.list_schemas().await.unwrap().is_empty());
    assert!(harness.runner.calls().is_empty());
}

#[tokio::test]
async fn test_failed_step_halts_the_chain() {
    let (harness, executed) = scripted(Some(PipelineStep::ImportResource), None).await;
    let id = dispatch_scripted(&harness).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "failed");
    assert!(row.log.ends_with(
        "import_resource failed: unexpected layer structure: import_resource exploded\n"
    ));
    assert_eq!(
        *executed.lock().unwrap(),
        vec![PipelineStep::StartImport, PipelineStep::ImportResource]
    );
}

#[tokio::test]
async fn test_successful_chain_runs_in_order() {
    let (harness, executed) = scripted(None, None).await;
    let id = dispatch_scripted(&harness).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "success");
    assert_eq!(*executed.lock().unwrap(), IMPORT_TASKS.to_vec());
    for step in IMPORT_TASKS {
        assert!(row.log.contains(&format!("starting {step}\n")));
    }

    // Each step sees the output of the ones before it.
    let output: serde_json::Value =
        serde_json::from_str(row.output_json.as_deref().unwrap()).unwrap();
    let expected: Vec<_> = IMPORT_TASKS.iter().map(|s| s.as_str()).collect();
    assert_eq!(output["layers"], serde_json::json!(expected));
}

#[tokio::test]
async fn test_panicking_step_marks_execution_failed() {
    let (harness, executed) = scripted(None, Some(PipelineStep::PublishResource)).await;
    let id = dispatch_scripted(&harness).await;

    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "failed");
    assert!(
        row.log
            .contains("publish_resource failed: pipeline step panicked: boom at publish_resource"),
        "log:\n{}",
        row.log
    );
    assert_eq!(executed.lock().unwrap().len(), 3);

    // Workers survive the panic.
    let next = dispatch_scripted(&harness).await;
    let row = harness.wait_for_terminal(next).await;
    assert_eq!(row.status, "failed");
}

#[tokio::test]
async fn test_copy_reuses_the_recorded_handler() {
    let harness = TestPipeline::new().await;
    let (import_id, _) = import_gpkg(&harness, true).await;
    assert_eq!(harness.wait_for_terminal(import_id).await.status, "success");

    let source = harness
        .store
        .get_resources_for_execution(*import_id.as_uuid())
        .await
        .unwrap()
        .remove(0);
    let handler = harness
        .registry
        .handler_for_resource(source.resource_id)
        .await
        .unwrap()
        .expect("handler reference");

    let mut overrides = ResourceOverrides::new();
    overrides.insert("title".to_string(), serde_json::json!("new-title"));
    let copy_id = harness
        .orchestrator
        .dispatch_copy(handler.as_ref(), source.resource_id, overrides)
        .await
        .unwrap();

    let row = harness.wait_for_terminal(copy_id).await;
    assert_eq!(row.status, "success", "log:\n{}", row.log);
    assert_eq!(row.action, "copy");

    let copies = harness
        .store
        .get_resources_for_execution(*copy_id.as_uuid())
        .await
        .unwrap();
    assert_eq!(copies.len(), 1);
    let copy = &copies[0];
    let target = format!("stili_di_vita_{}", copy_id.short());
    assert_eq!(copy.title, "new-title");
    assert_eq!(copy.name, target);
    assert_eq!(copy.source_resource_id, Some(source.resource_id));
    assert_eq!(copy.files_json, source.files_json);
    assert_eq!(
        harness
            .store
            .get_handler_info(copy.resource_id)
            .await
            .unwrap()
            .unwrap()
            .handler_key,
        HandlerKind::GeoPackage.key()
    );

    let copy_args = harness.runner.call_args().pop().unwrap();
    assert_eq!(copy_args[copy_args.len() - 2..], ["-nln".to_string(), target.clone()]);
    assert!(copy_args.contains(&"stili_di_vita".to_string()));
    assert!(
        harness
            .store
            .get_schema_by_name(&target, "datastore")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_copy_of_missing_resource_fails() {
    let harness = TestPipeline::new().await;
    let handler = harness.registry.get(HandlerKind::GeoPackage).unwrap();
    let id = harness
        .orchestrator
        .dispatch_copy(handler.as_ref(), Uuid::new_v4(), ResourceOverrides::new())
        .await
        .unwrap();
    let row = harness.wait_for_terminal(id).await;
    assert_eq!(row.status, "failed");
    assert!(row.log.contains("start_copy failed: resource not found"));
}

#[tokio::test]
async fn test_resume_unfinished_executions() {
    let harness = TestPipeline::new().await;
    let (files, upload_dir) = staged_upload(harness.dir.path(), "stili.gpkg");
    let input = ExecutionInput::for_import(files, ImportOptions::default(), Some(upload_dir));

    // An import that was interrupted while loading data.
    let interrupted = ExecutionId::new();
    harness
        .tracker()
        .create(
            interrupted,
            ExecutionAction::Import,
            Some(HandlerKind::GeoPackage),
            &serde_json::to_value(&input).unwrap(),
        )
        .await
        .unwrap();
    harness
        .tracker()
        .update(
            interrupted,
            ExecutionStatus::Running,
            PipelineStep::ImportResource,
            ImportStage::Importing,
            "starting import_resource",
        )
        .await
        .unwrap();

    // A record whose handler no longer exists.
    let orphan = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    harness
        .store
        .create_execution(&ExecutionRow {
            exec_id: orphan,
            action: "import".to_string(),
            status: "running".to_string(),
            step: "import_resource".to_string(),
            stage: "importing".to_string(),
            handler: Some("importer.handlers.csv.CsvHandler".to_string()),
            input_json: "{}".to_string(),
            output_json: None,
            log: String::new(),
            created_at: now,
            last_updated: now,
        })
        .await
        .unwrap();

    let resumed = harness.orchestrator.resume_unfinished().await.unwrap();
    assert_eq!(resumed, 1);

    let row = harness.wait_for_terminal(interrupted).await;
    assert_eq!(row.status, "success", "log:\n{}", row.log);
    assert!(!row.log.contains("starting start_import"));
    assert_eq!(
        harness
            .store
            .get_resources_for_execution(*interrupted.as_uuid())
            .await
            .unwrap()
            .len(),
        1
    );

    let orphan_row = harness
        .wait_for_terminal(ExecutionId::from(orphan))
        .await;
    assert_eq!(orphan_row.status, "failed");
    assert!(orphan_row.log.contains("cannot resume"));
}
