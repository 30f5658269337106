// ABOUTME: Translates a DesiredState into the resource specs of a bootstrap plan.
// ABOUTME: Validates service references and toggles before any spec is produced.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::desired::{DatabaseSpec, DependentService, DesiredState, ObjectStorageSpec, ServiceSpec};
use super::error::PlanError;
use super::spec::{
    EnvSource, IngressPayload, IngressRule, JobPayload, ResourcePayload, ResourceSpec,
    SecretValue, ServicePort, VolumeClaim, Workload,
};
use super::Plan;
use crate::types::{ResourceId, ResourceName};

/// Value of the `app.kubernetes.io/managed-by` label on every generated object.
pub const MANAGED_BY: &str = "bootstrapper";

const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
const LABEL_COMPONENT: &str = "app.kubernetes.io/name";

/// Service names taken by the objects generated for dependent services.
const RESERVED_SERVICE_NAMES: [(&str, DependentService); 2] = [
    ("db", DependentService::Database),
    ("storage", DependentService::ObjectStorage),
];

/// Build the plan for `desired`.
///
/// Deterministic: identical input yields identical specs in identical order.
pub fn build_plan(desired: &DesiredState) -> Result<Plan, PlanError> {
    validate(desired)?;
    let specs = PlanBuilder::new(desired).build()?;
    Plan::new(specs)
}

fn validate(desired: &DesiredState) -> Result<(), PlanError> {
    let mut names = HashSet::new();
    for service in desired.services.iter() {
        if !names.insert(service.name.as_str()) {
            return Err(PlanError::DuplicateService(service.name.to_string()));
        }
        if let Some(&(_, owner)) = RESERVED_SERVICE_NAMES
            .iter()
            .find(|(reserved, _)| *reserved == service.name.as_str())
        {
            return Err(PlanError::ReservedServiceName {
                service: service.name.to_string(),
                owner,
            });
        }
    }

    for service in desired.services.iter() {
        if let Some(&missing) = service.requires.iter().find(|d| !desired.provides(**d)) {
            return Err(PlanError::DisabledDependency {
                service: service.name.to_string(),
                dependency: missing,
            });
        }
        if let Some(unknown) = service
            .depends_on
            .iter()
            .find(|dep| !names.contains(dep.as_str()))
        {
            return Err(PlanError::UnknownService {
                referenced_by: format!("service '{}'", service.name),
                name: unknown.to_string(),
            });
        }
    }

    if let Some(ingress) = &desired.ingress
        && let Some(route) = ingress
            .routes
            .iter()
            .find(|r| !names.contains(r.service.as_str()))
    {
        return Err(PlanError::UnknownService {
            referenced_by: "ingress".to_string(),
            name: route.service.to_string(),
        });
    }

    Ok(())
}

/// Ids of the specs generated for a dependent service, for wiring dependents.
struct Provisioned {
    secret: ResourceId,
    ready_gates: Vec<ResourceId>,
}

struct PlanBuilder<'a> {
    desired: &'a DesiredState,
    specs: Vec<ResourceSpec>,
}

impl<'a> PlanBuilder<'a> {
    fn new(desired: &'a DesiredState) -> Self {
        Self {
            desired,
            specs: Vec::new(),
        }
    }

    fn instance(&self) -> &ResourceName {
        &self.desired.instance
    }

    fn namespace(&self) -> Option<ResourceName> {
        Some(self.desired.namespace.clone())
    }

    fn labels(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
            (LABEL_INSTANCE.to_string(), self.instance().to_string()),
            (LABEL_COMPONENT.to_string(), component.to_string()),
        ])
    }

    fn selector(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_INSTANCE.to_string(), self.instance().to_string()),
            (LABEL_COMPONENT.to_string(), component.to_string()),
        ])
    }

    fn push(&mut self, spec: ResourceSpec) -> ResourceId {
        let id = spec.id.clone();
        self.specs.push(spec);
        id
    }

    fn build(mut self) -> Result<Vec<ResourceSpec>, PlanError> {
        let desired = self.desired;
        let namespace = self.push(ResourceSpec::new(
            desired.namespace.clone(),
            None,
            ResourcePayload::Namespace {
                labels: BTreeMap::from([
                    (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
                    (LABEL_INSTANCE.to_string(), self.instance().to_string()),
                ]),
            },
        ));

        let config_map = self.config_map(&namespace)?;

        let database = match &desired.database {
            Some(db) => Some(self.database(db, &namespace)?),
            None => None,
        };
        let storage = match &desired.object_storage {
            Some(storage) => Some(self.object_storage(storage, &namespace)?),
            None => None,
        };

        let mut services: HashMap<&'a str, (ResourceName, u16, ResourceId)> = HashMap::new();

        for service in desired.services.iter() {
            let object_name = self.instance().child(service.name.as_str())?;
            let service_id = self.push(self.app_service(service, &object_name, &namespace));
            services.insert(
                service.name.as_str(),
                (object_name.clone(), service.port, service_id),
            );
        }

        for service in desired.services.iter() {
            let object_name = self.instance().child(service.name.as_str())?;
            let mut deps = vec![namespace.clone(), config_map.clone()];
            let mut env_from = vec![EnvSource::ConfigMap(self.config_map_name()?.to_string())];

            for requirement in &service.requires {
                let provisioned = match requirement {
                    DependentService::Database => database.as_ref(),
                    DependentService::ObjectStorage => storage.as_ref(),
                };
                if let Some(p) = provisioned {
                    deps.push(p.secret.clone());
                    deps.extend(p.ready_gates.iter().cloned());
                    env_from.push(EnvSource::Secret(secret_name_of(&p.secret)));
                }
            }

            for dep in &service.depends_on {
                deps.push(deployment_id(desired, dep)?);
            }

            let workload = Workload {
                image: service.image.clone(),
                replicas: service.replicas,
                labels: self.labels(service.name.as_str()),
                port: service.port,
                args: Vec::new(),
                env: service.env.clone(),
                env_from,
                sizing: service.sizing.clone(),
            };
            self.push(
                ResourceSpec::new(
                    object_name,
                    self.namespace(),
                    ResourcePayload::Deployment { workload },
                )
                .depends_on(&deps),
            );
        }

        if let Some(ingress) = &desired.ingress {
            let mut deps = vec![namespace.clone()];
            let mut rules = Vec::new();
            for route in &ingress.routes {
                if let Some((object_name, port, service_id)) = services.get(route.service.as_str())
                {
                    deps.push(service_id.clone());
                    rules.push(IngressRule {
                        path: route.path.clone(),
                        service: object_name.to_string(),
                        port: *port,
                    });
                }
            }
            self.push(
                ResourceSpec::new(
                    self.instance().clone(),
                    self.namespace(),
                    ResourcePayload::Ingress(IngressPayload {
                        host: ingress.host.clone(),
                        class: ingress.class.clone(),
                        tls_secret: ingress.tls_secret.clone(),
                        rules,
                    }),
                )
                .depends_on(&deps),
            );
        }

        Ok(self.specs)
    }

    fn config_map_name(&self) -> Result<ResourceName, PlanError> {
        Ok(self.instance().child("config")?)
    }

    fn config_map(&mut self, namespace: &ResourceId) -> Result<ResourceId, PlanError> {
        let desired = self.desired;
        let ns = &desired.namespace;
        let mut data = BTreeMap::from([("INSTANCE_NAME".to_string(), self.instance().to_string())]);

        if let Some(db) = &desired.database {
            let host = self.instance().child("db")?;
            data.insert("DATABASE_HOST".to_string(), format!("{host}.{ns}.svc"));
            data.insert("DATABASE_PORT".to_string(), db.port.to_string());
            data.insert("DATABASE_NAME".to_string(), db.database.clone());
        }

        if let Some(storage) = &desired.object_storage {
            let host = self.instance().child("storage")?;
            data.insert(
                "STORAGE_ENDPOINT".to_string(),
                format!("http://{host}.{ns}.svc:{}", storage.port),
            );
            let buckets: Vec<&str> = storage.buckets.iter().map(ResourceName::as_str).collect();
            data.insert("STORAGE_BUCKETS".to_string(), buckets.join(","));
        }

        let spec = ResourceSpec::new(
            self.config_map_name()?,
            self.namespace(),
            ResourcePayload::ConfigMap { data },
        )
        .depends_on([namespace]);
        Ok(self.push(spec))
    }

    fn database(
        &mut self,
        db: &DatabaseSpec,
        namespace: &ResourceId,
    ) -> Result<Provisioned, PlanError> {
        let name = self.instance().child("db")?;
        let secret_name = self.instance().child("db-credentials")?;

        let secret = self.push(
            ResourceSpec::new(
                secret_name.clone(),
                self.namespace(),
                ResourcePayload::Secret {
                    data: BTreeMap::from([
                        ("POSTGRES_DB".to_string(), SecretValue::new(&db.database)),
                        ("POSTGRES_USER".to_string(), SecretValue::new(&db.user)),
                        ("POSTGRES_PASSWORD".to_string(), SecretValue::new(&db.password)),
                    ]),
                },
            )
            .depends_on([namespace]),
        );

        let service = self.push(
            ResourceSpec::new(
                name.clone(),
                self.namespace(),
                ResourcePayload::Service {
                    selector: self.selector("database"),
                    ports: vec![ServicePort {
                        name: "postgres".to_string(),
                        port: db.port,
                        target_port: db.port,
                    }],
                    headless: true,
                },
            )
            .depends_on([namespace]),
        );

        let workload = Workload {
            image: db.image.clone(),
            replicas: 1,
            labels: self.labels("database"),
            port: db.port,
            args: Vec::new(),
            env: BTreeMap::new(),
            env_from: vec![EnvSource::Secret(secret_name.to_string())],
            sizing: Default::default(),
        };
        let statefulset = self.push(
            ResourceSpec::new(
                name.clone(),
                self.namespace(),
                ResourcePayload::StatefulSet {
                    workload,
                    service_name: name.to_string(),
                    volume: VolumeClaim {
                        name: "data".to_string(),
                        mount_path: "/var/lib/postgresql/data".to_string(),
                        size: db.storage.clone(),
                    },
                },
            )
            .depends_on([namespace, &secret, &service]),
        );

        Ok(Provisioned {
            secret,
            ready_gates: vec![statefulset],
        })
    }

    fn object_storage(
        &mut self,
        storage: &ObjectStorageSpec,
        namespace: &ResourceId,
    ) -> Result<Provisioned, PlanError> {
        let name = self.instance().child("storage")?;
        let secret_name = self.instance().child("storage-credentials")?;

        let secret = self.push(
            ResourceSpec::new(
                secret_name.clone(),
                self.namespace(),
                ResourcePayload::Secret {
                    data: BTreeMap::from([
                        (
                            "MINIO_ROOT_USER".to_string(),
                            SecretValue::new(&storage.access_key),
                        ),
                        (
                            "MINIO_ROOT_PASSWORD".to_string(),
                            SecretValue::new(&storage.secret_key),
                        ),
                    ]),
                },
            )
            .depends_on([namespace]),
        );

        let service = self.push(
            ResourceSpec::new(
                name.clone(),
                self.namespace(),
                ResourcePayload::Service {
                    selector: self.selector("object-storage"),
                    ports: vec![ServicePort {
                        name: "s3".to_string(),
                        port: storage.port,
                        target_port: storage.port,
                    }],
                    headless: true,
                },
            )
            .depends_on([namespace]),
        );

        let workload = Workload {
            image: storage.image.clone(),
            replicas: 1,
            labels: self.labels("object-storage"),
            port: storage.port,
            args: vec![
                "server".to_string(),
                "/data".to_string(),
                "--address".to_string(),
                format!(":{}", storage.port),
            ],
            env: BTreeMap::new(),
            env_from: vec![EnvSource::Secret(secret_name.to_string())],
            sizing: Default::default(),
        };
        let statefulset = self.push(
            ResourceSpec::new(
                name.clone(),
                self.namespace(),
                ResourcePayload::StatefulSet {
                    workload,
                    service_name: name.to_string(),
                    volume: VolumeClaim {
                        name: "data".to_string(),
                        mount_path: "/data".to_string(),
                        size: storage.storage.clone(),
                    },
                },
            )
            .depends_on([namespace, &secret, &service]),
        );

        let mut ready_gates = vec![statefulset.clone()];

        if !storage.buckets.is_empty() {
            let targets: Vec<String> = storage
                .buckets
                .iter()
                .map(|b| format!("local/{b}"))
                .collect();
            let script = format!(
                "mc alias set local http://{name}:{port} \"$MINIO_ROOT_USER\" \"$MINIO_ROOT_PASSWORD\" && mc mb --ignore-existing {targets}",
                port = storage.port,
                targets = targets.join(" "),
            );
            let job = self.push(
                ResourceSpec::new(
                    self.instance().child("storage-buckets")?,
                    self.namespace(),
                    ResourcePayload::Job(JobPayload {
                        image: storage.image.clone(),
                        command: vec!["/bin/sh".to_string(), "-c".to_string(), script],
                        env_from: vec![EnvSource::Secret(secret_name.to_string())],
                        backoff_limit: 4,
                    }),
                )
                .depends_on([&secret, &statefulset]),
            );
            ready_gates.push(job);
        }

        Ok(Provisioned {
            secret,
            ready_gates,
        })
    }

    fn app_service(
        &self,
        service: &ServiceSpec,
        object_name: &ResourceName,
        namespace: &ResourceId,
    ) -> ResourceSpec {
        ResourceSpec::new(
            object_name.clone(),
            self.namespace(),
            ResourcePayload::Service {
                selector: self.selector(service.name.as_str()),
                ports: vec![ServicePort {
                    name: "http".to_string(),
                    port: service.port,
                    target_port: service.port,
                }],
                headless: false,
            },
        )
        .depends_on([namespace])
    }
}

fn deployment_id(desired: &DesiredState, service: &ResourceName) -> Result<ResourceId, PlanError> {
    let name = desired.instance.child(service.as_str())?;
    Ok(ResourceId::for_object(
        "Deployment",
        Some(desired.namespace.as_str()),
        name.as_str(),
    ))
}

fn secret_name_of(id: &ResourceId) -> String {
    id.as_str()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
