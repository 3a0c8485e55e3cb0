use super::ProjectDescriptor;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Ordered, validated set of descriptors.
///
/// Table order is the tie-breaker for the build order, so it is kept as
/// declared.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    projects: Vec<ProjectDescriptor>,
    index: BTreeMap<String, usize>,
}

impl DescriptorTable {
    /// Names must be unique and every dependency must name a project in the
    /// same table.
    pub fn new(projects: Vec<ProjectDescriptor>) -> Result<Self> {
        let mut index = BTreeMap::new();
        for (i, p) in projects.iter().enumerate() {
            if index.insert(p.name.clone(), i).is_some() {
                return Err(Error::Config(format!("duplicate project name '{}'", p.name)));
            }
        }

        for p in &projects {
            for dep in &p.dependencies {
                if dep == &p.name {
                    return Err(Error::Config(format!("{}: project depends on itself", p.name)));
                }
                if !index.contains_key(dep) {
                    return Err(Error::Config(format!(
                        "{}: unknown dependency '{}'",
                        p.name, dep
                    )));
                }
            }
        }

        Ok(Self { projects, index })
    }

    pub fn get(&self, name: &str) -> Option<&ProjectDescriptor> {
        self.index.get(name).map(|&i| &self.projects[i])
    }

    /// Entry at a declaration-order position.
    pub fn at(&self, pos: usize) -> Option<&ProjectDescriptor> {
        self.projects.get(pos)
    }

    /// Position in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectDescriptor> {
        self.projects.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.projects.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
