//! Known schema versions and the migrators between them.

use crate::error::{MigrateError, MigrateResult};
use async_trait::async_trait;
use std::collections::HashSet;
use theia_store::{SchemaRepo, StoreResult};

/// One directed transformation between adjacent schema versions.
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn apply(&self, store: &dyn SchemaRepo) -> StoreResult<()>;
}

/// Migrator for transitions that leave stored data untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMigrator;

#[async_trait]
impl Migrator for NoopMigrator {
    async fn apply(&self, _store: &dyn SchemaRepo) -> StoreResult<()> {
        Ok(())
    }
}

/// Migrator that runs a fixed list of statements in order.
#[derive(Clone, Debug, Default)]
pub struct SqlMigrator {
    statements: Vec<String>,
}

impl SqlMigrator {
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Migrator for SqlMigrator {
    async fn apply(&self, store: &dyn SchemaRepo) -> StoreResult<()> {
        for statement in &self.statements {
            tracing::debug!(statement = %statement, "Executing migration statement");
            store.execute(statement).await?;
        }
        Ok(())
    }
}

/// A version reachable from its predecessor in the chain.
struct ChainEntry {
    version: String,
    /// Predecessor to this version.
    forward: Box<dyn Migrator>,
    /// This version back to its predecessor.
    backward: Box<dyn Migrator>,
}

/// Ordered table of schema versions, each paired with the steps leading
/// to and from its predecessor.
pub struct VersionChain {
    earliest: String,
    entries: Vec<ChainEntry>,
}

/// Which way a migration walks the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
    Unchanged,
}

/// A single step of a migration plan.
pub struct PlannedStep<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub migrator: &'a dyn Migrator,
}

/// Steps needed to move between two versions, in execution order.
pub struct MigrationPlan<'a> {
    pub direction: Direction,
    pub steps: Vec<PlannedStep<'a>>,
}

impl VersionChain {
    /// Start a chain at the earliest known version.
    pub fn new(earliest: impl Into<String>) -> Self {
        Self {
            earliest: earliest.into(),
            entries: Vec::new(),
        }
    }

    /// Append the next version with the migrators connecting it to the current last one.
    pub fn push(
        &mut self,
        version: impl Into<String>,
        forward: Box<dyn Migrator>,
        backward: Box<dyn Migrator>,
    ) -> MigrateResult<()> {
        let version = version.into();
        if self.index_of(&version).is_some() {
            return Err(MigrateError::DuplicateVersion(version));
        }
        self.entries.push(ChainEntry {
            version,
            forward,
            backward,
        });
        Ok(())
    }

    /// Build a chain from an ordered version list and one migrator list per direction.
    ///
    /// `forward[i]` upgrades `versions[i]` to `versions[i + 1]` and
    /// `backward[i]` reverses it.
    pub fn from_parts(
        versions: &[&str],
        forward: Vec<Box<dyn Migrator>>,
        backward: Vec<Box<dyn Migrator>>,
    ) -> MigrateResult<Self> {
        let expected = versions.len().saturating_sub(1);
        for (direction, actual) in [("upgrading", forward.len()), ("downgrading", backward.len())] {
            if actual != expected {
                return Err(MigrateError::MigratorCountMismatch {
                    direction,
                    actual,
                    expected,
                    versions: versions.len(),
                });
            }
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = versions.iter().find(|v| !seen.insert(**v)) {
            return Err(MigrateError::DuplicateVersion(duplicate.to_string()));
        }

        let Some((earliest, rest)) = versions.split_first() else {
            return Err(MigrateError::EmptyVersionOrder);
        };
        let mut chain = Self::new(*earliest);
        for ((version, forward), backward) in rest.iter().zip(forward).zip(backward) {
            chain.push(*version, forward, backward)?;
        }
        Ok(chain)
    }

    /// Versions shipped with this release.
    pub fn builtin() -> MigrateResult<Self> {
        Self::from_parts(
            &["v0.1.0", "v0.2.0"],
            vec![Box::new(NoopMigrator)],
            vec![Box::new(NoopMigrator)],
        )
    }

    /// The version assumed for data written before versions were recorded.
    pub fn earliest(&self) -> &str {
        &self.earliest
    }

    pub fn latest(&self) -> &str {
        self.entries
            .last()
            .map_or(self.earliest.as_str(), |entry| entry.version.as_str())
    }

    /// Position of `version` in the chain.
    pub fn index_of(&self, version: &str) -> Option<usize> {
        if version == self.earliest {
            return Some(0);
        }
        self.entries
            .iter()
            .position(|entry| entry.version == version)
            .map(|i| i + 1)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.index_of(version).is_some()
    }

    fn version_at(&self, index: usize) -> &str {
        match index {
            0 => &self.earliest,
            i => &self.entries[i - 1].version,
        }
    }

    /// Plan the steps from `from` to `to`.
    ///
    /// Downgrades apply the backward migrators of the same steps an upgrade
    /// would use, newest first.
    pub fn plan(&self, from: &str, to: &str) -> MigrateResult<MigrationPlan<'_>> {
        let from_index = self
            .index_of(from)
            .ok_or_else(|| MigrateError::UnrecognizedVersion {
                kind: "data schema",
                version: from.to_string(),
            })?;
        let to_index = self
            .index_of(to)
            .ok_or_else(|| MigrateError::UnrecognizedVersion {
                kind: "target",
                version: to.to_string(),
            })?;

        let (direction, steps) = if from_index < to_index {
            let steps = (from_index..to_index)
                .map(|i| PlannedStep {
                    from: self.version_at(i),
                    to: self.version_at(i + 1),
                    migrator: self.entries[i].forward.as_ref(),
                })
                .collect();
            (Direction::Upgrade, steps)
        } else if from_index > to_index {
            let steps = (to_index..from_index)
                .rev()
                .map(|i| PlannedStep {
                    from: self.version_at(i + 1),
                    to: self.version_at(i),
                    migrator: self.entries[i].backward.as_ref(),
                })
                .collect();
            (Direction::Downgrade, steps)
        } else {
            (Direction::Unchanged, Vec::new())
        };

        Ok(MigrationPlan { direction, steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noops(count: usize) -> Vec<Box<dyn Migrator>> {
        (0..count)
            .map(|_| Box::new(NoopMigrator) as Box<dyn Migrator>)
            .collect()
    }

    fn four_versions() -> VersionChain {
        VersionChain::from_parts(&["v0.1.0", "v0.2.0", "v0.3.0", "v0.4.0"], noops(3), noops(3))
            .unwrap()
    }

    fn hops(plan: &MigrationPlan<'_>) -> Vec<(String, String)> {
        plan.steps
            .iter()
            .map(|step| (step.from.to_string(), step.to.to_string()))
            .collect()
    }

    #[test]
    fn builtin_chain_orders_known_versions() {
        let chain = VersionChain::builtin().unwrap();
        assert_eq!(chain.index_of("v0.1.0"), Some(0));
        assert_eq!(chain.index_of("v0.2.0"), Some(1));
        assert_eq!(chain.index_of("v0.3.0"), None);
        assert_eq!(chain.earliest(), "v0.1.0");
        assert_eq!(chain.latest(), "v0.2.0");
    }

    #[test]
    fn upgrade_walks_steps_in_increasing_order() {
        let chain = four_versions();
        let plan = chain.plan("v0.1.0", "v0.4.0").unwrap();
        assert_eq!(plan.direction, Direction::Upgrade);
        assert_eq!(
            hops(&plan),
            vec![
                ("v0.1.0".to_string(), "v0.2.0".to_string()),
                ("v0.2.0".to_string(), "v0.3.0".to_string()),
                ("v0.3.0".to_string(), "v0.4.0".to_string()),
            ]
        );
    }

    #[test]
    fn downgrade_mirrors_upgrade() {
        let chain = four_versions();
        let up = chain.plan("v0.2.0", "v0.4.0").unwrap();
        let down = chain.plan("v0.4.0", "v0.2.0").unwrap();
        assert_eq!(down.direction, Direction::Downgrade);

        let mut reversed: Vec<_> = hops(&up).into_iter().map(|(a, b)| (b, a)).collect();
        reversed.reverse();
        assert_eq!(hops(&down), reversed);
    }

    #[test]
    fn same_version_plans_nothing() {
        let chain = four_versions();
        let plan = chain.plan("v0.3.0", "v0.3.0").unwrap();
        assert_eq!(plan.direction, Direction::Unchanged);
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn plan_rejects_unknown_versions() {
        let chain = four_versions();
        assert!(matches!(
            chain.plan("v9.9.9", "v0.1.0"),
            Err(MigrateError::UnrecognizedVersion { kind: "data schema", .. })
        ));
        assert!(matches!(
            chain.plan("v0.1.0", "latest"),
            Err(MigrateError::UnrecognizedVersion { kind: "target", .. })
        ));
    }

    #[test]
    fn from_parts_rejects_misaligned_migrators() {
        let err = VersionChain::from_parts(&["v0.1.0", "v0.2.0", "v0.3.0"], noops(2), noops(1))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            MigrateError::MigratorCountMismatch {
                direction: "downgrading",
                actual: 1,
                expected: 2,
                ..
            }
        ));

        let err = VersionChain::from_parts(&["v0.1.0", "v0.2.0"], noops(0), noops(1))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            MigrateError::MigratorCountMismatch { direction: "upgrading", .. }
        ));
    }

    #[test]
    fn from_parts_rejects_duplicates_and_empty_order() {
        let err = VersionChain::from_parts(&["v0.1.0", "v0.1.0"], noops(1), noops(1))
            .err()
            .unwrap();
        assert!(matches!(err, MigrateError::DuplicateVersion(v) if v == "v0.1.0"));

        assert!(matches!(
            VersionChain::from_parts(&[], noops(0), noops(0)),
            Err(MigrateError::EmptyVersionOrder)
        ));
    }

    #[test]
    fn push_extends_the_chain() {
        let mut chain = VersionChain::new("v0.1.0");
        chain
            .push("v0.2.0", Box::new(NoopMigrator), Box::new(NoopMigrator))
            .unwrap();
        assert_eq!(chain.latest(), "v0.2.0");
        assert!(chain.contains("v0.2.0"));
        assert!(matches!(
            chain.push("v0.1.0", Box::new(NoopMigrator), Box::new(NoopMigrator)),
            Err(MigrateError::DuplicateVersion(_))
        ));
    }
}
