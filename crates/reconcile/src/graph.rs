//! Dependency ordering over the resource graph.

use crate::resource::{Application, Handle, ResourceArena};
use std::collections::HashSet;

/// Flatten the application graph into dependency order.
///
/// Post-order depth-first traversal starting from each root in list
/// order: every resource appears exactly once, strictly after all of its
/// dependencies. Sharing is decided by handle identity, so a role used by
/// three functions shows up a single time, before the first of them.
pub fn dependency_order(app: &Application) -> Vec<Handle> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for &root in &app.resources {
        visit(&app.arena, root, &mut seen, &mut ordered);
    }
    ordered
}

fn visit(arena: &ResourceArena, handle: Handle, seen: &mut HashSet<Handle>, out: &mut Vec<Handle>) {
    if !seen.insert(handle) {
        return;
    }
    for dep in arena.get(handle).dependencies() {
        visit(arena, dep, seen, out);
    }
    out.push(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        DeploymentPackage, LambdaFunction, ManagedIamRole, Placeholder, ResourceKind,
        ScheduledEvent,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_arena() -> (ResourceArena, Handle, Handle, Handle) {
        let mut arena = ResourceArena::new();
        let pkg = arena.add(ResourceKind::DeploymentPackage(DeploymentPackage {
            resource_name: "deployment_package".to_string(),
            filename: Placeholder::Ready("app.zip".to_string()),
            content_hash: Placeholder::Ready("abc".to_string()),
        }));
        let role = arena.add(ResourceKind::ManagedIamRole(ManagedIamRole {
            resource_name: "default-role".to_string(),
            role_name: "app-dev".to_string(),
            trust_policy: json!({}),
            policy_document: json!({}),
        }));
        (arena, pkg, role, pkg)
    }

    fn add_function(arena: &mut ResourceArena, name: &str, pkg: Handle, role: Handle) -> Handle {
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

    #[test]
    fn empty_application_yields_empty_order() {
        let app = Application {
            stage: "dev".to_string(),
            resources: Vec::new(),
            arena: ResourceArena::new(),
        };
        assert!(dependency_order(&app).is_empty());
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let (mut arena, pkg, role, _) = test_arena();
        let func = add_function(&mut arena, "worker", pkg, role);
        let event = arena.add(ResourceKind::ScheduledEvent(ScheduledEvent {
            resource_name: "tick-schedule".to_string(),
            rule_name: "app-dev-tick".to_string(),
            schedule_expression: "rate(5 minutes)".to_string(),
            lambda_function: func,
        }));

        let app = Application {
            stage: "dev".to_string(),
            resources: vec![event],
            arena,
        };
        let order = dependency_order(&app);

        let pos = |h: Handle| order.iter().position(|&o| o == h).unwrap();
        assert!(pos(pkg) < pos(func));
        assert!(pos(role) < pos(func));
        assert!(pos(func) < pos(event));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn shared_dependency_appears_once() {
        let (mut arena, pkg, role, _) = test_arena();
        let a = add_function(&mut arena, "a", pkg, role);
        let b = add_function(&mut arena, "b", pkg, role);

        let app = Application {
            stage: "dev".to_string(),
            resources: vec![a, b],
            arena,
        };
        let order = dependency_order(&app);

        assert_eq!(order.len(), 4);
        assert_eq!(order.iter().filter(|&&h| h == role).count(), 1);
        assert_eq!(order.iter().filter(|&&h| h == pkg).count(), 1);
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        // Property from the dependency builder contract, checked over a
        // wider graph with two event sources sharing one function.
        let (mut arena, pkg, role, _) = test_arena();
        let func = add_function(&mut arena, "worker", pkg, role);
        let tick = arena.add(ResourceKind::ScheduledEvent(ScheduledEvent {
            resource_name: "tick-schedule".to_string(),
            rule_name: "app-dev-tick".to_string(),
            schedule_expression: "rate(1 minute)".to_string(),
            lambda_function: func,
        }));
        let tock = arena.add(ResourceKind::ScheduledEvent(ScheduledEvent {
            resource_name: "tock-schedule".to_string(),
            rule_name: "app-dev-tock".to_string(),
            schedule_expression: "rate(2 minutes)".to_string(),
            lambda_function: func,
        }));

        let app = Application {
            stage: "dev".to_string(),
            resources: vec![tick, tock],
            arena,
        };
        let order = dependency_order(&app);

        for (i, &handle) in order.iter().enumerate() {
            for dep in app.arena.get(handle).dependencies() {
                let dep_pos = order.iter().position(|&o| o == dep).unwrap();
                assert!(dep_pos < i, "dependency listed after its dependent");
            }
        }
    }
}
