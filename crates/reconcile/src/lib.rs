//! # reconcile
//!
//! The deployment reconciliation engine.
//!
//! This crate turns a desired-state resource graph plus the last-known
//! deployed state into an ordered list of idempotent instructions, sweeps
//! resources that are no longer referenced, and executes the result
//! against a cloud client.
//!
//! ## Core Concepts
//!
//! - **ResourceArena / ResourceKind**: the typed resource graph, addressed
//!   by handles so sharing is explicit data
//! - **dependency_order**: flattens the graph leaves-first
//! - **PlanStage**: emits create-or-update instruction sequences per kind
//! - **Sweeper**: appends teardown sequences for orphaned resources
//! - **Executor**: runs the plan sequentially, resolving deferred values
//! - **DeployedState**: the persisted ledger the next deploy diffs against
//!
//! ## Pipeline
//!
//! ```ignore
//! let order = dependency_order(&app);
//! let mut plan = PlanStage::new(&deployed).execute(&app.arena, &order)?;
//! Sweeper::new().execute(&mut plan, &deployed);
//! let mut executor = Executor::new(&client);
//! executor.execute(&plan)?;
//! let new_state = DeployedState::from_records(executor.into_records());
//! ```

pub mod executor;
pub mod graph;
pub mod plan;
pub mod planner;
pub mod resource;
pub mod state;
pub mod sweeper;

// Re-export main types at crate root
pub use executor::{DeployError, Executor, NoProgress, ProgressCallback};
pub use graph::dependency_order;
pub use plan::{Builtin, Instruction, Param, ParamMap, Plan};
pub use planner::{PlanError, PlanStage};
pub use resource::{
    ApiMapping, ApiProtocol, Application, DeploymentPackage, DomainName, DynamoDbEventSource,
    Handle, KinesisEventSource, LambdaFunction, LambdaLayer, ManagedIamRole, Placeholder,
    PreCreatedIamRole, ResourceArena, ResourceKind, RestApi, S3BucketNotification, ScheduledEvent,
    SnsSubscription, SqsEventSource, WebsocketApi,
};
pub use state::{DeployedState, RecordedResource, SCHEMA_VERSION};
pub use sweeper::Sweeper;
