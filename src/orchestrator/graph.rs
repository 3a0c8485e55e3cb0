//! Build order: requested closure plus Kahn's algorithm.

use crate::descriptor::{DescriptorTable, ProjectDescriptor};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Names in `requested` plus all of their transitive dependencies, in an
/// order where every dependency precedes its dependents. An empty request
/// means the whole table.
///
/// Among projects whose dependencies are all placed, the one declared first
/// in the table goes next.
pub fn resolve_order(table: &DescriptorTable, requested: &[String]) -> Result<Vec<String>> {
    let selected = closure(table, requested)?;

    // Positions stand in for names so the ready set orders by table position.
    let mut indegree: BTreeMap<usize, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &pos in &selected {
        let d = table_entry(table, pos)?;
        indegree.insert(pos, d.dependencies.len());
        for dep in &d.dependencies {
            let dep_pos = position(table, dep)?;
            dependents.entry(dep_pos).or_default().push(pos);
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(&p, _)| p)
        .collect();
    let mut order = Vec::with_capacity(selected.len());

    while let Some(pos) = ready.pop_first() {
        order.push(table_entry(table, pos)?.name.clone());
        for &next in dependents.get(&pos).map(Vec::as_slice).unwrap_or_default() {
            if let Some(n) = indegree.get_mut(&next) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(next);
                }
            }
        }
    }

    if order.len() < selected.len() {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let remaining: Vec<usize> = selected
            .iter()
            .copied()
            .filter(|&p| {
                table_entry(table, p)
                    .map(|d| !placed.contains(d.name.as_str()))
                    .unwrap_or(false)
            })
            .collect();
        return Err(Error::Cycle {
            cycle: find_cycle(table, &remaining),
        });
    }

    Ok(order)
}

/// Table positions of `requested` and everything they depend on.
fn closure(table: &DescriptorTable, requested: &[String]) -> Result<BTreeSet<usize>> {
    if requested.is_empty() {
        return Ok((0..table.len()).collect());
    }

    let mut seen = BTreeSet::new();
    let mut stack = Vec::new();
    for name in requested {
        let pos = table
            .position(name)
            .ok_or_else(|| Error::Config(format!("unknown project '{}'", name)))?;
        stack.push(pos);
    }
    while let Some(pos) = stack.pop() {
        if !seen.insert(pos) {
            continue;
        }
        for dep in &table_entry(table, pos)?.dependencies {
            stack.push(position(table, dep)?);
        }
    }
    Ok(seen)
}

/// One cycle among `remaining`, as a closed path `a -> b -> ... -> a`.
///
/// Every node left over after Kahn's algorithm has a dependency that is also
/// left over, so walking dependencies from any of them must revisit a node.
fn find_cycle(table: &DescriptorTable, remaining: &[usize]) -> Vec<String> {
    let names = |p: usize| {
        table_entry(table, p)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    };
    let left: BTreeSet<usize> = remaining.iter().copied().collect();
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(i) = path.iter().position(|&p| p == current) {
            let mut cycle: Vec<String> = path[i..].iter().map(|&p| names(p)).collect();
            cycle.push(names(current));
            return cycle;
        }
        path.push(current);
        let next = table_entry(table, current).ok().and_then(|d| {
            d.dependencies
                .iter()
                .filter_map(|dep| table.position(dep))
                .find(|p| left.contains(p))
        });
        match next {
            Some(n) => current = n,
            None => return path.iter().map(|&p| names(p)).collect(),
        }
    }
}

fn position(table: &DescriptorTable, name: &str) -> Result<usize> {
    table
        .position(name)
        .ok_or_else(|| Error::Config(format!("unknown dependency '{}'", name)))
}

fn table_entry(table: &DescriptorTable, pos: usize) -> Result<&ProjectDescriptor> {
    table
        .at(pos)
        .ok_or_else(|| Error::Config(format!("no project at position {}", pos)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BuildKind;

    const SHA: &str = "c4d91be36fc8e54deae7575241e03f4211eb102afb3fc0775fbbc1b740016705";

    fn project(name: &str, deps: &[&str]) -> ProjectDescriptor {
        ProjectDescriptor::builder(
            name,
            &format!("http://example.invalid/{}-1.0.tar.gz", name),
            SHA,
            "lib/libx.a",
            BuildKind::Autotools,
        )
        .depends_on(deps.iter().copied())
        .build()
        .unwrap()
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dependencies_come_first_and_ties_follow_table_order() {
        let table = DescriptorTable::new(vec![
            project("curl", &["zlib", "openssl"]),
            project("opus", &[]),
            project("openssl", &[]),
            project("zlib", &[]),
        ])
        .unwrap();
        let order = resolve_order(&table, &[]).unwrap();
        assert_eq!(order, names(&["opus", "openssl", "zlib", "curl"]));
    }

    #[test]
    fn request_pulls_in_transitive_dependencies_only() {
        let table = DescriptorTable::new(vec![
            project("a", &[]),
            project("b", &["a"]),
            project("c", &["b"]),
            project("d", &[]),
        ])
        .unwrap();
        let order = resolve_order(&table, &names(&["c"])).unwrap();
        assert_eq!(order, names(&["a", "b", "c"]));
    }

    #[test]
    fn unknown_request_is_config_error() {
        let table = DescriptorTable::new(vec![project("a", &[])]).unwrap();
        let err = resolve_order(&table, &names(&["nope"])).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("nope")));
    }

    #[test]
    fn cycle_is_reported_with_its_members() {
        let table = DescriptorTable::new(vec![
            project("root", &[]),
            project("a", &["root", "c"]),
            project("b", &["a"]),
            project("c", &["b"]),
        ])
        .unwrap();
        match resolve_order(&table, &[]).unwrap_err() {
            Error::Cycle { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
                for n in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|c| c == n));
                }
                assert!(!cycle.iter().any(|c| c == "root"));
            }
            other => panic!("expected cycle, got {other}"),
        }
    }
}
