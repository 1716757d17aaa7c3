//! Sweeper configuration.
//!
//! A configuration is three sets of issue kinds:
//! - `type_change`: type-change kinds, always reactive
//! - `readable`: readable kinds checked on every mutation
//! - `report`: readable or report kinds checked during a sweep
//!
//! A readable kind is in at most one of `readable` and `report`.
//!
//! Configurations can be loaded from TOML:
//!
//! ```toml
//! [checks]
//! type_change = ["primitiveToPrimitive", "primitiveToNull"]
//! reactive = ["keyInjection"]
//! on_demand = ["keyMismatch", "rootMismatch"]
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{SweeperError, SweeperResult};
use crate::issues::{DetectionFamily, IssueKind};
use crate::tree::EventCategory;

/// Prefix for environment overrides, e.g. `TREESWEEPER__CHECKS__REACTIVE`.
pub const ENV_PREFIX: &str = "TREESWEEPER";

/// Options accepted by [`Sweeper::enable`](super::Sweeper::enable).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnableOptions {
    /// `None` means "not given". Type-change kinds reject any value.
    pub reactive: Option<bool>,
}

impl EnableOptions {
    pub fn reactive() -> Self {
        Self {
            reactive: Some(true),
        }
    }

    pub fn on_demand() -> Self {
        Self {
            reactive: Some(false),
        }
    }
}

/// Which issue kinds are enabled, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    pub type_change: BTreeSet<IssueKind>,
    pub readable: BTreeSet<IssueKind>,
    pub report: BTreeSet<IssueKind>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            type_change: BTreeSet::from([
                IssueKind::PrimitiveToPrimitive,
                IssueKind::PrimitiveToObject,
                IssueKind::PrimitiveToArray,
                IssueKind::PrimitiveToNull,
            ]),
            readable: BTreeSet::from([IssueKind::KeyInjection, IssueKind::KeyMismatch]),
            report: BTreeSet::from([
                IssueKind::UndefinedNodeNotOnArrayParent,
                IssueKind::ValueTypeMismatch,
                IssueKind::ParentNotObjectOrArray,
            ]),
        }
    }
}

impl SweeperConfig {
    /// A configuration with nothing enabled.
    pub fn empty() -> Self {
        Self {
            type_change: BTreeSet::new(),
            readable: BTreeSet::new(),
            report: BTreeSet::new(),
        }
    }

    /// Every kind enabled, readable kinds reactively.
    pub fn all() -> Self {
        let mut config = Self::empty();
        for kind in IssueKind::ALL {
            match kind.family() {
                DetectionFamily::TypeChange => config.type_change.insert(kind),
                DetectionFamily::Readable => config.readable.insert(kind),
                DetectionFamily::Report => config.report.insert(kind),
            };
        }
        config
    }

    /// Kinds that run for notifications of `category`.
    pub fn reactive_kinds(&self, category: EventCategory) -> &BTreeSet<IssueKind> {
        match category {
            EventCategory::TypeChange => &self.type_change,
            EventCategory::Readable => &self.readable,
        }
    }

    /// Whether roots need a listener for `category`.
    pub fn wants(&self, category: EventCategory) -> bool {
        !self.reactive_kinds(category).is_empty()
    }

    pub fn is_enabled(&self, kind: IssueKind) -> bool {
        self.type_change.contains(&kind) || self.readable.contains(&kind) || self.report.contains(&kind)
    }

    /// Places `kind` in the mapping selected by `options`.
    pub fn enable(&mut self, kind: IssueKind, options: EnableOptions) -> SweeperResult<()> {
        match (kind.family(), options.reactive) {
            (DetectionFamily::TypeChange, Some(reactive)) => Err(SweeperError::IllegalOption {
                kind,
                family: DetectionFamily::TypeChange.as_str(),
                reactive,
            }),
            (DetectionFamily::TypeChange, None) => {
                self.type_change.insert(kind);
                Ok(())
            }
            (DetectionFamily::Report, Some(true)) => Err(SweeperError::IllegalOption {
                kind,
                family: DetectionFamily::Report.as_str(),
                reactive: true,
            }),
            (DetectionFamily::Report, _) => {
                self.report.insert(kind);
                Ok(())
            }
            (DetectionFamily::Readable, Some(true)) => {
                self.readable.insert(kind);
                self.report.remove(&kind);
                Ok(())
            }
            (DetectionFamily::Readable, _) => {
                self.report.insert(kind);
                self.readable.remove(&kind);
                Ok(())
            }
        }
    }

    /// Removes `kind` from whichever mapping holds it. Returns whether it was
    /// enabled.
    pub fn disable(&mut self, kind: IssueKind) -> bool {
        let a = self.type_change.remove(&kind);
        let b = self.readable.remove(&kind);
        let c = self.report.remove(&kind);
        a || b || c
    }

    /// Checks that every kind sits in a mapping its family allows.
    pub fn validate(&self) -> SweeperResult<()> {
        check_families(&self.type_change, &[DetectionFamily::TypeChange], "type_change")?;
        check_families(&self.readable, &[DetectionFamily::Readable], "reactive")?;
        check_families(
            &self.report,
            &[DetectionFamily::Readable, DetectionFamily::Report],
            "on_demand",
        )?;

        if let Some(kind) = self.readable.intersection(&self.report).next() {
            return Err(SweeperError::InvalidConfig(format!(
                "{} cannot be both reactive and on demand",
                kind
            )));
        }
        Ok(())
    }

    /// Loads a configuration from a TOML file, with `TREESWEEPER__`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be parsed or names an unknown issue kind
    /// - The result fails [`validate`](Self::validate)
    pub fn load<P: AsRef<Path>>(path: P) -> SweeperResult<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| SweeperError::InvalidConfig(format!("invalid path: {:?}", path)))?;

        if !path.exists() {
            return Err(SweeperError::ConfigNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::with_name(path_str))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("checks.type_change")
                    .with_list_parse_key("checks.reactive")
                    .with_list_parse_key("checks.on_demand")
                    .try_parsing(true),
            )
            .build()?;

        let file: ConfigFile = config.try_deserialize()?;
        Self::from_file(file)
    }

    /// Parses the `[checks]` table from a TOML string.
    pub fn from_toml_str(contents: &str) -> SweeperResult<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, config::FileFormat::Toml))
            .build()?;
        let file: ConfigFile = config.try_deserialize()?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> SweeperResult<Self> {
        let Some(checks) = file.checks else {
            return Ok(Self::default());
        };
        let config = Self {
            type_change: checks.type_change.into_iter().collect(),
            readable: checks.reactive.into_iter().collect(),
            report: checks.on_demand.into_iter().collect(),
        };
        config.validate()?;
        Ok(config)
    }

    /// The `[checks]` table describing this configuration.
    pub fn to_checks(&self) -> ChecksSection {
        ChecksSection {
            type_change: self.type_change.iter().copied().collect(),
            reactive: self.readable.iter().copied().collect(),
            on_demand: self.report.iter().copied().collect(),
        }
    }
}

fn check_families(
    set: &BTreeSet<IssueKind>,
    allowed: &[DetectionFamily],
    section: &str,
) -> SweeperResult<()> {
    match set.iter().find(|k| !allowed.contains(&k.family())) {
        Some(kind) => Err(SweeperError::InvalidConfig(format!(
            "{} is a {} check and cannot be listed under {}",
            kind,
            kind.family(),
            section
        ))),
        None => Ok(()),
    }
}

/// On-disk layout of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    /// Absent means "use the defaults".
    #[serde(default)]
    checks: Option<ChecksSection>,
}

/// The `[checks]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksSection {
    #[serde(default)]
    pub type_change: Vec<IssueKind>,
    #[serde(default)]
    pub reactive: Vec<IssueKind>,
    #[serde(default)]
    pub on_demand: Vec<IssueKind>,
}
