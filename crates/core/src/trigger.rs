use crate::models::{BranchConfig, Repository};

/// Why a valid event produced no build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownRepository,
    BranchNotEnabled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::UnknownRepository => "repository is not bound to any account",
            SkipReason::BranchNotEnabled => "CI is not enabled for this branch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed(Repository),
    Skip(SkipReason),
}

/// Decide whether a resolved (repository, branch config) pair triggers a
/// build. Absence of a config row leaves the branch disabled: automation is
/// opt-in per branch, and an owner who never enabled a branch must never see
/// a build fire for it.
pub fn decide(repository: Option<Repository>, config: Option<&BranchConfig>) -> Decision {
    let Some(repository) = repository else {
        return Decision::Skip(SkipReason::UnknownRepository);
    };
    match config {
        Some(config) if config.ci_enabled => Decision::Proceed(repository),
        _ => Decision::Skip(SkipReason::BranchNotEnabled),
    }
}
