use migstep_common::{Direction, Error, Result};
use tracing::{debug, error, info, warn};

use crate::loader::MigrationLoader;
use crate::migration::{DefaultExecutor, MigrationExecutor};
use crate::processor::Processor;
use crate::registry::MigrationRegistry;
use crate::report::{FailureLog, MigrationState, MigrationStatus, StepReport};
use crate::version::{DEFAULT_VERSION_TABLE, VersionInfo, VersionStore};

/// Runner settings that do not depend on where they were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub version_table: String,
    /// Capture failing statements inside a migration instead of aborting it.
    pub tolerant: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            tolerant: false,
        }
    }
}

/// A finished walk and the error that stopped it early, if any.
struct Walk {
    report: StepReport,
    error: Option<Error>,
}

/// Moves a database between migration versions.
///
/// Version info and the registry are loaded once by [`ensure_loaded`] and
/// cached until [`reload`]. A runner must not be driven by more than one
/// caller at a time against the same database.
///
/// [`ensure_loaded`]: MigrationRunner::ensure_loaded
/// [`reload`]: MigrationRunner::reload
pub struct MigrationRunner<P: Processor> {
    processor: P,
    loader: Box<dyn MigrationLoader>,
    executor: Box<dyn MigrationExecutor>,
    store: VersionStore,
    options: RunnerOptions,
    version_info: Option<VersionInfo>,
    registry: Option<MigrationRegistry>,
    failures: FailureLog,
}

impl<P: Processor> MigrationRunner<P> {
    pub fn new(processor: P, loader: impl MigrationLoader + 'static, options: RunnerOptions) -> Self {
        let store = VersionStore::new(options.version_table.clone());
        Self {
            processor,
            loader: Box::new(loader),
            executor: Box::new(DefaultExecutor),
            store,
            options,
            version_info: None,
            registry: None,
            failures: FailureLog::default(),
        }
    }

    pub fn with_executor(mut self, executor: impl MigrationExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    pub fn into_processor(self) -> P {
        self.processor
    }

    /// Load version info and the registry if they are not cached yet.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.version_info.is_none() {
            let info = self
                .store
                .load_version_info(&mut self.processor, self.executor.as_ref())?;
            debug!(
                "loaded version info: current={} previous={}",
                info.current_version, info.previous_version
            );
            self.version_info = Some(info);
        }
        if self.registry.is_none() {
            self.registry = Some(MigrationRegistry::load(self.loader.as_ref())?);
        }
        Ok(())
    }

    /// Drop both caches and load them again.
    pub fn reload(&mut self) -> Result<()> {
        self.version_info = None;
        self.registry = None;
        self.ensure_loaded()
    }

    /// Cached version info; `None` until loaded.
    pub fn version_info(&self) -> Option<&VersionInfo> {
        self.version_info.as_ref()
    }

    /// Cached registry; `None` until loaded.
    pub fn registry(&self) -> Option<&MigrationRegistry> {
        self.registry.as_ref()
    }

    pub fn current_version(&mut self) -> Result<i64> {
        self.ensure_loaded()?;
        Ok(self.cached_current())
    }

    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Persist a new version row and cache what reads back.
    pub fn save_version_state(&mut self, current: i64, previous: i64) -> Result<()> {
        let info = self
            .store
            .save_version_state(&mut self.processor, current, previous)?;
        self.version_info = Some(info);
        Ok(())
    }

    pub fn status(&mut self) -> Result<MigrationStatus> {
        self.ensure_loaded()?;
        let info = self.version_info.clone().unwrap_or_default();
        let registry = loaded(&self.registry)?;
        let current_ordinal = registry
            .ordinal(info.current_version)
            .map_err(|_| Error::InconsistentState(info.current_version))?;

        let migrations = registry
            .iter()
            .enumerate()
            .map(|(idx, entry)| MigrationState {
                version: entry.version(),
                name: entry.name().to_string(),
                applied: (idx as isize) <= current_ordinal,
            })
            .collect();

        Ok(MigrationStatus {
            current_version: info.current_version,
            previous_version: info.previous_version,
            latest_version: registry.latest_version(),
            migrations,
        })
    }

    /// Apply forward migrations after `from` up to and including `to`.
    pub fn step_up(&mut self, from: i64, to: i64) -> Result<StepReport> {
        self.walk(from, to, Direction::Up)?.into_result()
    }

    /// Revert migrations from `from` down to, but not including, `to`.
    /// `to == 0` reverts every known migration.
    pub fn step_down(&mut self, from: i64, to: i64) -> Result<StepReport> {
        self.walk(from, to, Direction::Down)?.into_result()
    }

    /// Upgrade from the persisted version to `target`.
    ///
    /// When a step fails after at least one step completed and
    /// `auto_rollback` is set, the completed steps are reverted before the
    /// original error is returned.
    pub fn upgrade_to_version(&mut self, target: i64, auto_rollback: bool) -> Result<StepReport> {
        self.ensure_loaded()?;
        let current = self.cached_current();
        {
            let registry = loaded(&self.registry)?;
            if !registry.contains(target) {
                return Err(Error::UnknownVersion(target));
            }
            if current != 0 && !registry.contains(current) {
                return Err(Error::InconsistentState(current));
            }
        }

        let walk = self.walk(current, target, Direction::Up)?;
        let Some(err) = walk.error else {
            info!("upgraded from version {current} to {target}");
            return Ok(walk.report);
        };

        let reached = walk.report.last_version;
        if !auto_rollback || walk.report.is_noop() {
            warn!("upgrade to {target} failed at version {reached}: {err}");
            return Err(err);
        }

        warn!("upgrade to {target} failed: {err}; rolling back from {reached} to {current}");
        match self.walk(reached, current, Direction::Down) {
            Ok(Walk { error: None, .. }) => {
                info!("rollback restored version {current}");
            }
            Ok(Walk {
                report,
                error: Some(rollback_err),
            }) => {
                error!(
                    "rollback to {current} failed at version {}: {rollback_err}",
                    report.last_version
                );
            }
            Err(rollback_err) => {
                error!("rollback to {current} could not start: {rollback_err}");
            }
        }
        Err(err)
    }

    /// Upgrade to the highest registered version.
    ///
    /// Compatibility note: the upgrade always runs without automatic
    /// rollback, whatever `auto_rollback` says.
    pub fn upgrade_to_latest(&mut self, auto_rollback: bool) -> Result<StepReport> {
        self.ensure_loaded()?;
        let current = self.cached_current();
        let latest = loaded(&self.registry)?.latest_version();

        if latest == current {
            debug!("already at latest version {latest}");
            return Ok(StepReport::new(current, latest, Direction::Up));
        }
        if auto_rollback {
            debug!("automatic rollback is not used when upgrading to latest");
        }
        self.upgrade_to_version(latest, false)
    }

    /// Revert from the persisted version down to `target`.
    pub fn rollback_to(&mut self, target: i64) -> Result<StepReport> {
        let current = self.current_version()?;
        self.step_down(current, target)
    }

    /// Revert the last `steps` applied migrations. Reverts everything when
    /// fewer than `steps` are applied.
    pub fn rollback_steps(&mut self, steps: usize) -> Result<StepReport> {
        let current = self.current_version()?;
        let target = {
            let registry = loaded(&self.registry)?;
            let ordinal = registry
                .ordinal(current)
                .map_err(|_| Error::InconsistentState(current))?;
            let back = isize::try_from(steps).unwrap_or(isize::MAX);
            registry.version_at(ordinal.saturating_sub(back))
        };
        self.step_down(current, target)
    }

    fn cached_current(&self) -> i64 {
        self.version_info
            .as_ref()
            .map(|v| v.current_version)
            .unwrap_or(0)
    }

    fn walk(&mut self, from: i64, to: i64, direction: Direction) -> Result<Walk> {
        self.ensure_loaded()?;
        let prior = self.cached_current();
        let registry = loaded(&self.registry)?;

        let from_ordinal = registry.ordinal(from)?;
        let to_ordinal = registry.ordinal(to)?;
        let wrong_way = match direction {
            Direction::Up => from_ordinal > to_ordinal,
            Direction::Down => from_ordinal < to_ordinal,
        };
        if wrong_way {
            return Err(Error::InvalidDirection {
                from,
                to,
                direction,
            });
        }

        let mut report = StepReport::new(from, to, direction);
        if from_ordinal == to_ordinal {
            debug!("already at version {to}, nothing to step {direction}");
            return Ok(Walk {
                report,
                error: None,
            });
        }

        let ordinals: Vec<isize> = match direction {
            Direction::Up => (from_ordinal + 1..=to_ordinal).collect(),
            Direction::Down => (to_ordinal + 1..=from_ordinal).rev().collect(),
        };

        let mut failure = None;
        for ordinal in ordinals {
            let Some(entry) = registry.entry_at(ordinal) else {
                break;
            };
            info!(
                "migrating {direction}: {} {}",
                entry.version(),
                entry.name()
            );

            let applied = self.executor.apply(
                &mut self.processor,
                entry.version(),
                entry.migration(),
                direction,
                self.options.tolerant,
            );
            report.captured.extend(applied.captured);

            if let Err(e) = applied.outcome {
                warn!(
                    "migration {} {} ({direction}) failed: {e}",
                    entry.version(),
                    entry.name()
                );
                failure = Some(e);
                break;
            }

            report.applied.push(entry.version());
            report.last_version = match direction {
                Direction::Up => entry.version(),
                Direction::Down => registry.version_at(ordinal - 1),
            };
        }

        self.failures.extend(report.captured.iter().cloned());

        if !report.applied.is_empty()
            && let Err(save_err) = self.save_version_state(report.last_version, prior)
        {
            match failure {
                Some(ref step_err) => {
                    error!(
                        "failed to record version {} after {step_err}: {save_err}",
                        report.last_version
                    );
                }
                None => return Err(save_err),
            }
        }

        Ok(Walk {
            report,
            error: failure,
        })
    }
}

impl Walk {
    fn into_result(self) -> Result<StepReport> {
        match self.error {
            None => Ok(self.report),
            Some(e) => Err(e),
        }
    }
}

fn loaded(registry: &Option<MigrationRegistry>) -> Result<&MigrationRegistry> {
    registry
        .as_ref()
        .ok_or_else(|| Error::Other("migration registry is not loaded".into()))
}
