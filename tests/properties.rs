// ABOUTME: Property tests for plan construction and engine scheduling.
// ABOUTME: Random topologies must yield acyclic deterministic plans and dependency-safe runs.

mod support;

use bootstrapper::control_plane::{ControlPlaneError, MemoryControlPlane, Operation};
use bootstrapper::engine::{Engine, Phase, RunOptions, RunOutcome, RunState, events};
use bootstrapper::plan::{
    DatabaseSpec, DependentService, DesiredState, IngressRoute, IngressSpec, ObjectStorageSpec,
    Plan, ServiceSpec, build_plan,
};
use bootstrapper::types::{ImageRef, ResourceId, RunId};
use nonempty::NonEmpty;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use support::{config_map, drain, engine_config, name, namespace};

/// Services wired by bitmask: bit j of `masks[i]` makes service i depend on service j < i.
fn desired(
    count: usize,
    masks: &[u8],
    database: bool,
    storage: bool,
    ingress: bool,
) -> DesiredState {
    let services: Vec<ServiceSpec> = (0..count)
        .map(|i| {
            let mut requires = Vec::new();
            if database && masks[i] & 0x80 != 0 {
                requires.push(DependentService::Database);
            }
            if storage && masks[i] & 0x40 != 0 {
                requires.push(DependentService::ObjectStorage);
            }
            ServiceSpec {
                name: name(&format!("svc-{i}")),
                image: ImageRef::parse("ghcr.io/example/chat:1.0").unwrap(),
                replicas: 1,
                port: 8000 + i as u16,
                sizing: Default::default(),
                env: BTreeMap::from([("INDEX".to_string(), i.to_string())]),
                requires,
                depends_on: (0..i)
                    .filter(|j| (masks[i] >> j) & 1 == 1)
                    .map(|j| name(&format!("svc-{j}")))
                    .collect(),
            }
        })
        .collect();

    DesiredState {
        instance: name("chat"),
        namespace: name("chat"),
        services: NonEmpty::from_vec(services).unwrap(),
        database: database.then(|| DatabaseSpec {
            image: ImageRef::parse("postgres:16").unwrap(),
            storage: "1Gi".into(),
            port: 5432,
            database: "chat".into(),
            user: "chat".into(),
            password: "hunter2".into(),
        }),
        object_storage: storage.then(|| ObjectStorageSpec {
            image: ImageRef::parse("minio/minio:latest").unwrap(),
            storage: "1Gi".into(),
            port: 9000,
            buckets: vec![name("attachments")],
            access_key: "access".into(),
            secret_key: "secret".into(),
        }),
        ingress: ingress.then(|| IngressSpec {
            host: "chat.example.com".into(),
            class: None,
            tls_secret: None,
            routes: vec![IngressRoute {
                path: "/".into(),
                service: name("svc-0"),
            }],
        }),
    }
}

fn ids(plan: &Plan) -> Vec<ResourceId> {
    plan.specs().iter().map(|s| s.id.clone()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plans_are_ordered_and_deterministic(
        count in 1usize..6,
        masks in proptest::collection::vec(any::<u8>(), 6),
        database in any::<bool>(),
        storage in any::<bool>(),
        ingress in any::<bool>(),
    ) {
        let desired = desired(count, &masks, database, storage, ingress);
        let first = build_plan(&desired).unwrap();
        let second = build_plan(&desired).unwrap();

        prop_assert_eq!(ids(&first), ids(&second));
        prop_assert_eq!(first.fingerprint(), second.fingerprint());

        for spec in first.specs() {
            let at = first.position(&spec.id).unwrap();
            for dep in &spec.depends_on {
                prop_assert!(first.position(dep).unwrap() < at, "{} before {}", dep, spec.id);
            }
        }
    }

    #[test]
    fn runs_never_start_a_resource_before_its_dependencies(
        masks in proptest::collection::vec(any::<u8>(), 2..8),
        failures in proptest::collection::vec(0usize..3, 8),
        max_in_flight in 1usize..4,
    ) {
        let ns = namespace("ns");
        let mut specs = vec![ns.clone()];
        for (i, mask) in masks.iter().enumerate() {
            let deps: Vec<ResourceId> = (0..i)
                .filter(|j| (mask >> j) & 1 == 1)
                .map(|j| specs[j + 1].id.clone())
                .chain([ns.id.clone()])
                .collect();
            specs.push(config_map("ns", &format!("cm-{i}")).depends_on(&deps));
        }
        let plan = Plan::new(specs).unwrap();

        let cp = Arc::new(MemoryControlPlane::new());
        for (spec, &n) in plan.specs().iter().zip(&failures) {
            cp.fail_apply(&spec.id, (0..n).map(|_| ControlPlaneError::Conflict("retry".into())));
        }

        let (tx, mut rx) = events::channel();
        let state = Arc::new(RunState::new(RunId::new("run-prop"), &plan).with_events(tx));
        let mut config = engine_config();
        config.max_in_flight = max_in_flight;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        let report = runtime.block_on(
            Engine::new(cp.clone(), config).run(&plan, state, RunOptions::default()),
        );
        prop_assert_eq!(report.outcome, RunOutcome::Succeeded);

        let mut ready = HashSet::new();
        for event in drain(&mut rx) {
            if event.from == Phase::Pending && event.phase == Phase::Applying {
                let spec = plan.get(&event.resource_id).unwrap();
                for dep in &spec.depends_on {
                    prop_assert!(ready.contains(dep), "{} started before {}", spec.id, dep);
                }
            }
            if event.phase == Phase::Ready {
                ready.insert(event.resource_id);
            }
        }

        for (spec, &n) in plan.specs().iter().zip(&failures) {
            prop_assert_eq!(cp.count(Operation::Apply, &spec.id), n + 1);
        }
    }
}
