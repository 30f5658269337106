// ABOUTME: Dependency graph ordering for resource specs.
// ABOUTME: Kahn's algorithm with declaration-order tie-breaking, plus cycle extraction.

use std::collections::{BTreeSet, HashMap};

use super::error::PlanError;
use super::spec::ResourceSpec;
use crate::types::ResourceId;

/// Return spec indices in dependency order.
///
/// Among specs that become eligible at the same time the one declared first
/// wins, so the same input always produces the same order.
pub(crate) fn topological_order(specs: &[ResourceSpec]) -> Result<Vec<usize>, PlanError> {
    let index: HashMap<&ResourceId, usize> =
        specs.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();

    let mut indegree = vec![0usize; specs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];

    for (i, spec) in specs.iter().enumerate() {
        for dep in &spec.depends_on {
            let j = *index.get(dep).ok_or_else(|| PlanError::UnknownResource {
                resource: spec.id.to_string(),
                dependency: dep.to_string(),
            })?;
            indegree[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(specs.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &d in &dependents[next] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < specs.len() {
        let stuck: BTreeSet<usize> = (0..specs.len()).filter(|&i| indegree[i] > 0).collect();
        return Err(PlanError::Cycle(find_cycle(specs, &index, &stuck)));
    }

    Ok(order)
}

/// Walk dependencies among the unsortable specs until a node repeats.
///
/// Every stuck spec has at least one stuck dependency, so the walk always closes a loop.
fn find_cycle(
    specs: &[ResourceSpec],
    index: &HashMap<&ResourceId, usize>,
    stuck: &BTreeSet<usize>,
) -> Vec<String> {
    let Some(&start) = stuck.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = specs[current]
            .depends_on
            .iter()
            .filter_map(|dep| index.get(dep).copied())
            .find(|j| stuck.contains(j));

        let Some(next) = next else {
            break;
        };

        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| specs[i].id.to_string())
                .collect();
            cycle.push(specs[next].id.to_string());
            return cycle;
        }

        path.push(next);
        current = next;
    }

    path.iter().map(|&i| specs[i].id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ResourcePayload;
    use crate::types::ResourceName;

    fn spec(name: &str) -> ResourceSpec {
        ResourceSpec::new(
            ResourceName::new(name).unwrap(),
            Some(ResourceName::new("ns").unwrap()),
            ResourcePayload::ConfigMap {
                data: Default::default(),
            },
        )
    }

    #[test]
    fn independent_specs_keep_declaration_order() {
        let specs = vec![spec("c"), spec("a"), spec("b")];
        assert_eq!(topological_order(&specs).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn dependencies_come_first() {
        let a = spec("a");
        let b = spec("b").depends_on([&a.id]);
        let specs = vec![b, a];
        assert_eq!(topological_order(&specs).unwrap(), vec![1, 0]);
    }

    #[test]
    fn cycle_is_reported_as_closed_path() {
        let a_id = spec("a").id;
        let b_id = spec("b").id;
        let a = spec("a").depends_on([&b_id]);
        let b = spec("b").depends_on([&a_id]);
        let err = topological_order(&[a, b]).unwrap_err();
        match err {
            PlanError::Cycle(path) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let ghost = spec("ghost").id;
        let a = spec("a").depends_on([&ghost]);
        assert!(matches!(
            topological_order(&[a]),
            Err(PlanError::UnknownResource { .. })
        ));
    }
}
