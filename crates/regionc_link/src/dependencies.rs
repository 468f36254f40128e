use std::collections::BTreeSet;

use regionc_method::MethodIdentity;

/// Direct callees of one method that must be linked with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySet {
    owner: MethodIdentity,
    callees: BTreeSet<MethodIdentity>,
}

impl DependencySet {
    pub fn new(owner: MethodIdentity) -> Self {
        Self {
            owner,
            callees: BTreeSet::new(),
        }
    }

    /// Records a direct call. Recursive self-calls are not dependencies.
    pub fn add(&mut self, callee: MethodIdentity) -> bool {
        if callee == self.owner {
            return false;
        }
        self.callees.insert(callee)
    }

    pub fn owner(&self) -> &MethodIdentity {
        &self.owner
    }

    pub fn callees(&self) -> impl Iterator<Item = &MethodIdentity> {
        self.callees.iter()
    }

    pub fn len(&self) -> usize {
        self.callees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callees.is_empty()
    }
}

impl Extend<MethodIdentity> for DependencySet {
    fn extend<T: IntoIterator<Item = MethodIdentity>>(&mut self, iter: T) {
        for callee in iter {
            self.add(callee);
        }
    }
}
