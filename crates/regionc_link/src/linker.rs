use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

use ahash::AHashSet;
use regionc_config::{BitcodeUnit, WorkspaceLayout};
use regionc_method::MethodIdentity;
use regionc_utils::fs::{LineFilter, SHARED_RW, read_lines, remove_if_exists, write_atomic};
use tracing::{debug, info};

use crate::dependencies::DependencySet;
use crate::error::LinkError;

/// Bitcode files handed to the IR linker for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInputs {
    pub inputs: Vec<PathBuf>,
    /// Entrypoint plus every method in its dependency closure
    pub linked_methods: usize,
}

/// Computes dependency closures from per-method `deps.lnk` sidecars.
#[derive(Debug, Clone)]
pub struct DependencyLinker {
    layout: WorkspaceLayout,
}

impl DependencyLinker {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn has_dependencies(&self, method: &MethodIdentity) -> bool {
        self.layout.dependencies(method.signature()).is_file()
    }

    /// Direct callees listed in the method's sidecar.
    pub fn direct_dependencies(
        &self,
        method: &MethodIdentity,
    ) -> Result<Vec<MethodIdentity>, LinkError> {
        let path = self.layout.dependencies(method.signature());
        let lines = read_lines(&path, LineFilter::SkipBlankAndComments).map_err(|source| {
            LinkError::Io {
                path: path.clone(),
                source,
            }
        })?;
        lines
            .into_iter()
            .map(|line| {
                line.parse().map_err(|source| LinkError::Corrupt {
                    path: path.clone(),
                    line,
                    source,
                })
            })
            .collect()
    }

    /// Transitive closure of the entrypoint's direct dependencies.
    ///
    /// # Panics
    ///
    /// Panics if the entrypoint has no dependency file; callers must check
    /// [`DependencyLinker::has_dependencies`] first.
    pub fn get_link_set(
        &self,
        entrypoint: &MethodIdentity,
    ) -> Result<BTreeSet<MethodIdentity>, LinkError> {
        assert!(
            self.has_dependencies(entrypoint),
            "link set requested for {entrypoint} which has no dependency file"
        );

        let mut visited: AHashSet<MethodIdentity> = AHashSet::new();
        let mut queue: VecDeque<MethodIdentity> = self
            .direct_dependencies(entrypoint)?
            .into_iter()
            .filter(|callee| callee != entrypoint)
            .collect();

        while let Some(method) = queue.pop_front() {
            if !visited.insert(method.clone()) {
                continue;
            }
            if !self.has_dependencies(&method) {
                continue;
            }
            for callee in self.direct_dependencies(&method)? {
                if callee != *entrypoint && !visited.contains(&callee) {
                    queue.push_back(callee);
                }
            }
        }

        debug!(entrypoint = %entrypoint, closure = visited.len(), "computed link set");
        Ok(visited.into_iter().collect())
    }

    /// Writes the method's direct callees, or removes a stale sidecar when
    /// there are none.
    pub fn store_dependencies(&self, dependencies: &DependencySet) -> Result<(), LinkError> {
        let path = self.layout.dependencies(dependencies.owner().signature());
        let io_err = |source| LinkError::Io {
            path: path.clone(),
            source,
        };

        remove_if_exists(&path).map_err(io_err)?;
        if dependencies.is_empty() {
            return Ok(());
        }

        let mut contents = String::new();
        for callee in dependencies.callees() {
            contents.push_str(&callee.canonical());
            contents.push('\n');
        }
        write_atomic(&path, contents.as_bytes(), SHARED_RW).map_err(io_err)?;
        info!(
            method = %dependencies.owner(),
            callees = dependencies.len(),
            "stored dependencies"
        );
        Ok(())
    }

    /// Entrypoint's own outer and inner units plus the inner unit of every
    /// dependency.
    pub fn link_inputs(&self, entrypoint: &MethodIdentity) -> Result<LinkInputs, LinkError> {
        let signature = entrypoint.signature();
        let mut inputs = vec![
            self.layout.bitcode(signature, BitcodeUnit::Outer),
            self.layout.bitcode(signature, BitcodeUnit::Inner),
        ];
        let mut linked_methods = 1;

        if self.has_dependencies(entrypoint) {
            let link_set = self.get_link_set(entrypoint)?;
            linked_methods += link_set.len();
            inputs.extend(
                link_set
                    .iter()
                    .map(|dep| self.layout.bitcode(dep.signature(), BitcodeUnit::Inner)),
            );
        }

        Ok(LinkInputs {
            inputs,
            linked_methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regionc_method::MethodId;
    use std::fs;
    use tempfile::TempDir;

    fn method(index: u32) -> MethodIdentity {
        MethodIdentity::new(MethodId::new(0, index), format!("void a.B.m{index}()"))
    }

    fn store(linker: &DependencyLinker, owner: u32, callees: &[u32]) {
        let mut deps = DependencySet::new(method(owner));
        deps.extend(callees.iter().map(|&c| method(c)));
        linker.store_dependencies(&deps).unwrap();
    }

    fn ids(set: &BTreeSet<MethodIdentity>) -> Vec<u32> {
        set.iter().map(|m| m.id.index).collect()
    }

    #[test]
    fn test_closure_with_cycles_and_back_edges() {
        let dir = TempDir::new().unwrap();
        let linker = DependencyLinker::new(WorkspaceLayout::new(dir.path()));

        // 1 -> {2, 3}; 2 -> {3, 1}; 3 -> {4}; 4 -> {2}; 5 unreachable
        store(&linker, 1, &[2, 3, 3, 1]);
        store(&linker, 2, &[3, 1]);
        store(&linker, 3, &[4]);
        store(&linker, 4, &[2]);
        store(&linker, 5, &[1]);

        let set = linker.get_link_set(&method(1)).unwrap();
        assert_eq!(ids(&set), [2, 3, 4]);
    }

    #[test]
    fn test_closure_ignores_entrypoint_listed_in_sidecar() {
        let dir = TempDir::new().unwrap();
        let linker = DependencyLinker::new(WorkspaceLayout::new(dir.path()));
        let path = linker.layout().dependencies(method(1).signature());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let sidecar = format!("{}\n{}\n", method(1).canonical(), method(7).canonical());
        fs::write(&path, sidecar).unwrap();

        let set = linker.get_link_set(&method(1)).unwrap();
        assert_eq!(ids(&set), [7]);
    }

    #[test]
    #[should_panic(expected = "has no dependency file")]
    fn test_link_set_without_sidecar_panics() {
        let dir = TempDir::new().unwrap();
        let linker = DependencyLinker::new(WorkspaceLayout::new(dir.path()));
        let _ = linker.get_link_set(&method(1));
    }

    #[test]
    fn test_empty_store_removes_sidecar() {
        let dir = TempDir::new().unwrap();
        let linker = DependencyLinker::new(WorkspaceLayout::new(dir.path()));

        store(&linker, 1, &[2]);
        assert!(linker.has_dependencies(&method(1)));
        store(&linker, 1, &[1]);
        assert!(!linker.has_dependencies(&method(1)));
    }

    #[test]
    fn test_link_inputs() {
        let dir = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let linker = DependencyLinker::new(layout.clone());

        let solo = linker.link_inputs(&method(9)).unwrap();
        assert_eq!(solo.linked_methods, 1);
        assert_eq!(solo.inputs.len(), 2);

        store(&linker, 1, &[2]);
        store(&linker, 2, &[3]);
        let inputs = linker.link_inputs(&method(1)).unwrap();
        assert_eq!(inputs.linked_methods, 3);
        assert_eq!(
            inputs.inputs,
            vec![
                layout.bitcode(method(1).signature(), BitcodeUnit::Outer),
                layout.bitcode(method(1).signature(), BitcodeUnit::Inner),
                layout.bitcode(method(2).signature(), BitcodeUnit::Inner),
                layout.bitcode(method(3).signature(), BitcodeUnit::Inner),
            ]
        );
    }
}
