use core::cell::RefCell;
use std::collections::BTreeSet;

use regionc_link::DependencySet;
use regionc_method::MethodIdentity;

thread_local! {
    static CURRENT: RefCell<Option<CompilationContext>> = const { RefCell::new(None) };
}

/// Mutable state of the method currently being translated on this thread.
#[derive(Debug)]
pub struct CompilationContext {
    method: MethodIdentity,
    debug: bool,
    dependencies: DependencySet,
    cold_callees: BTreeSet<String>,
    histogram_additions: BTreeSet<String>,
    warnings: Vec<String>,
}

impl CompilationContext {
    pub fn new(method: MethodIdentity, debug: bool) -> Self {
        Self {
            dependencies: DependencySet::new(method.clone()),
            method,
            debug,
            cold_callees: BTreeSet::new(),
            histogram_additions: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn method(&self) -> &MethodIdentity {
        &self.method
    }

    /// Method is listed in the debug profile.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// A direct call to generated code; the callee must be linked in.
    pub fn record_direct_call(&mut self, callee: MethodIdentity) {
        self.dependencies.add(callee);
    }

    /// A call that goes back through the runtime because the callee is not
    /// compiled.
    pub fn record_cold_callee(&mut self, signature: impl Into<String>) {
        self.cold_callees.insert(signature.into());
    }

    /// A callee pulled in because the invoke histogram speculated on it.
    pub fn record_histogram_addition(&mut self, signature: impl Into<String>) {
        self.histogram_additions.insert(signature.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    pub fn into_parts(self) -> ContextParts {
        ContextParts {
            dependencies: self.dependencies,
            cold_callees: self.cold_callees,
            histogram_additions: self.histogram_additions,
            warnings: self.warnings,
        }
    }
}

/// What a finished translation left behind.
#[derive(Debug)]
pub struct ContextParts {
    pub dependencies: DependencySet,
    pub cold_callees: BTreeSet<String>,
    pub histogram_additions: BTreeSet<String>,
    pub warnings: Vec<String>,
}

/// Runs `f` against this thread's current context, if one is active.
pub fn with_current<R>(f: impl FnOnce(&mut CompilationContext) -> R) -> Option<R> {
    CURRENT.with(|current| current.borrow_mut().as_mut().map(f))
}

/// Installs `context` for the duration of `f` and returns it afterwards.
pub(crate) fn scoped<R>(
    context: CompilationContext,
    f: impl FnOnce() -> R,
) -> (R, CompilationContext) {
    struct Reset(Option<CompilationContext>);

    impl Drop for Reset {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }

    let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
    let reset = Reset(previous);
    let result = f();
    let finished = CURRENT.with(|current| current.borrow_mut().take());
    drop(reset);

    // `f` cannot remove the context: `with_current` only lends it
    match finished {
        Some(context) => (result, context),
        None => unreachable!("compilation context removed while translating"),
    }
}
