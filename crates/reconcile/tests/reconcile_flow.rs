//! End-to-end reconciliation: plan, execute, persist, re-plan, sweep.

use awskit::{ApiOp, FakeCloud};
use reconcile::{
    Application, DeployedState, DeploymentPackage, Executor, Handle, Instruction, LambdaFunction,
    ManagedIamRole, Placeholder, Plan, PlanStage, ResourceArena, ResourceKind,
    S3BucketNotification, Sweeper, dependency_order,
};
use serde_json::json;
use std::collections::BTreeMap;

fn package(arena: &mut ResourceArena) -> Handle {
    arena.add(ResourceKind::DeploymentPackage(DeploymentPackage {
        resource_name: "deployment_package".to_string(),
        filename: Placeholder::Ready("app.zip".to_string()),
        content_hash: Placeholder::Ready("abc123".to_string()),
    }))
}

fn role(arena: &mut ResourceArena) -> Handle {
    arena.add(ResourceKind::ManagedIamRole(ManagedIamRole {
        resource_name: "default-role".to_string(),
        role_name: "app-dev".to_string(),
        trust_policy: json!({"Version": "2012-10-17"}),
        policy_document: json!({"Statement": []}),
    }))
}

fn function(arena: &mut ResourceArena, name: &str, pkg: Handle, role: Handle) -> Handle {
    arena.add(ResourceKind::LambdaFunction(LambdaFunction {
        resource_name: name.to_string(),
        function_name: format!("app-dev-{name}"),
        deployment_package: pkg,
        role,
        runtime: "python3.12".to_string(),
        handler: format!("app.{name}"),
        memory_size: 128,
        timeout: 60,
        environment_variables: BTreeMap::new(),
        security_group_ids: Vec::new(),
        subnet_ids: Vec::new(),
        layers: Vec::new(),
        managed_layer: None,
    }))
}

fn app_with_functions(names: &[&str]) -> Application {
    let mut arena = ResourceArena::new();
    let pkg = package(&mut arena);
    let role = role(&mut arena);
    let resources = names
        .iter()
        .map(|name| function(&mut arena, name, pkg, role))
        .collect();
    Application {
        stage: "dev".to_string(),
        resources,
        arena,
    }
}

fn reconcile(app: &Application, deployed: &DeployedState, cloud: &FakeCloud) -> DeployedState {
    let order = dependency_order(app);
    let mut plan = PlanStage::new(deployed)
        .execute(&app.arena, &order)
        .expect("plan generation");
    Sweeper::new().execute(&mut plan, deployed);

    let mut executor = Executor::new(cloud);
    executor.execute(&plan).expect("plan execution");
    DeployedState::from_records(executor.into_records())
}

#[test]
fn first_deploy_creates_and_records_everything() {
    let app = app_with_functions(&["worker"]);
    let cloud = FakeCloud::new();
    let state = reconcile(&app, &DeployedState::default(), &cloud);

    assert_eq!(cloud.ops(), vec![ApiOp::CreateRole, ApiOp::CreateFunction]);
    assert!(state.contains("default-role"));
    assert!(state.contains("worker"));
    assert_eq!(
        state.resource_value("worker", "lambda_arn"),
        Some("arn:aws:lambda:us-west-2:123456789012:function:app-dev-worker")
    );
}

#[test]
fn second_deploy_converges_with_updates() {
    let app = app_with_functions(&["worker"]);
    let cloud = FakeCloud::new();
    let first = reconcile(&app, &DeployedState::default(), &cloud);

    let cloud = FakeCloud::new();
    let second = reconcile(&app, &first, &cloud);

    assert_eq!(
        cloud.ops(),
        vec![ApiOp::PutRolePolicy, ApiOp::UpdateFunction]
    );
    // Convergent: the ledger comes out identical either way.
    for name in ["default-role", "worker"] {
        assert_eq!(first.resource_values(name), second.resource_values(name));
    }
}

#[test]
fn removed_function_is_swept_on_the_next_deploy() {
    let both = app_with_functions(&["worker", "helper"]);
    let cloud = FakeCloud::new();
    let first = reconcile(&both, &DeployedState::default(), &cloud);
    assert!(first.contains("helper"));

    let reduced = app_with_functions(&["worker"]);
    let cloud = FakeCloud::new();
    let second = reconcile(&reduced, &first, &cloud);

    let deletes: Vec<ApiOp> = cloud
        .ops()
        .into_iter()
        .filter(|op| op.is_teardown())
        .collect();
    assert_eq!(deletes, vec![ApiOp::DeleteFunction]);
    let delete_params = &cloud.params_for(ApiOp::DeleteFunction)[0];
    assert_eq!(
        delete_params.get("function_name"),
        Some(&json!("app-dev-helper"))
    );
    assert!(!second.contains("helper"));
    assert!(second.contains("worker"));
}

#[test]
fn deleting_the_whole_app_tears_down_in_reverse_order() {
    let app = app_with_functions(&["worker"]);
    let cloud = FakeCloud::new();
    let deployed = reconcile(&app, &DeployedState::default(), &cloud);

    // An empty plan marks nothing; sweeping schedules every ledger record
    // for deletion, dependents first.
    let cloud = FakeCloud::new();
    let mut plan = Plan::new();
    Sweeper::new().execute(&mut plan, &deployed);
    let mut executor = Executor::new(&cloud);
    executor.execute(&plan).expect("teardown");

    assert_eq!(
        cloud.ops(),
        vec![
            ApiOp::DeleteFunction,
            ApiOp::DeleteRolePolicy,
            ApiOp::DeleteRole,
        ]
    );
}

#[test]
fn changed_bucket_tears_down_the_old_notification() {
    fn app_with_bucket(bucket: &str) -> Application {
        let mut arena = ResourceArena::new();
        let pkg = package(&mut arena);
        let role = role(&mut arena);
        let func = function(&mut arena, "on_upload", pkg, role);
        let event = arena.add(ResourceKind::S3BucketNotification(S3BucketNotification {
            resource_name: "upload-s3event".to_string(),
            bucket: bucket.to_string(),
            events: vec!["s3:ObjectCreated:*".to_string()],
            prefix: None,
            suffix: None,
            lambda_function: func,
        }));
        Application {
            stage: "dev".to_string(),
            resources: vec![event],
            arena,
        }
    }

    let cloud = FakeCloud::new();
    let first = reconcile(&app_with_bucket("bucket-a"), &DeployedState::default(), &cloud);
    assert_eq!(
        first.resource_value("upload-s3event", "bucket"),
        Some("bucket-a")
    );

    let cloud = FakeCloud::new();
    let second = reconcile(&app_with_bucket("bucket-b"), &first, &cloud);

    // The new bucket is wired up and the old one is unhooked, even though
    // the resource name stayed marked throughout.
    let connects = cloud.params_for(ApiOp::ConnectS3BucketToFunction);
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].get("bucket"), Some(&json!("bucket-b")));

    let disconnects = cloud.params_for(ApiOp::DisconnectS3BucketFromFunction);
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].get("bucket"), Some(&json!("bucket-a")));
    assert_eq!(cloud.params_for(ApiOp::RemovePermissionForS3Event).len(), 1);

    assert_eq!(
        second.resource_value("upload-s3event", "bucket"),
        Some("bucket-b")
    );
}

#[test]
fn plan_instructions_never_reference_later_outputs() {
    // Ordering guarantee over a wider graph: walk the plan front to back
    // and require every variable reference to have a producer behind it.
    let app = app_with_functions(&["a", "b", "c"]);
    let order = dependency_order(&app);
    let deployed = DeployedState::default();
    let plan = PlanStage::new(&deployed)
        .execute(&app.arena, &order)
        .unwrap();

    let mut produced: Vec<String> = Vec::new();
    for instruction in &plan.instructions {
        match instruction {
            Instruction::ApiCall {
                params, output_var, ..
            } => {
                for param in params.values() {
                    assert_refs_produced(param, &produced);
                }
                if let Some(var) = output_var {
                    produced.push(var.clone());
                }
            }
            Instruction::StoreValue { name, value } => {
                assert_refs_produced(value, &produced);
                produced.push(name.clone());
            }
            Instruction::BuiltinFunction { output_var, .. } => produced.push(output_var.clone()),
            Instruction::RecordResourceVariable { variable_name, .. } => {
                assert!(
                    produced.contains(variable_name),
                    "record of unproduced variable {variable_name}"
                );
            }
            Instruction::RecordResourceValue { .. } => {}
        }
    }
}

fn assert_refs_produced(param: &reconcile::Param, produced: &[String]) {
    match param {
        reconcile::Param::Literal(_) => {}
        reconcile::Param::Variable(name) => {
            assert!(produced.contains(name), "forward reference to {name}");
        }
        reconcile::Param::Format { vars, .. } => {
            for var in vars {
                assert!(produced.contains(var), "forward reference to {var}");
            }
        }
        reconcile::Param::List(items) => {
            for item in items {
                assert_refs_produced(item, produced);
            }
        }
        reconcile::Param::Map(entries) => {
            for value in entries.values() {
                assert_refs_produced(value, produced);
            }
        }
    }
}
