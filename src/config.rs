//! Configuration.
//!
//! This module contains the configuration read from a YAML file and the options resolved from it and the command line.

use crate::args::Args;
use crate::vars::*;
use anyhow::Context as _;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::instrument;

/// Name of the default configuration file.
pub(crate) const CONFIG_FILENAME: &str = "nvim-installer.yml";

/// Default base URL to download releases from.
pub(crate) const DEFAULT_URL: &str = "https://github.com";

/// Default installation prefix.
pub(crate) const DEFAULT_DESTINATION: &str = "/usr/local";

/// Default release.
pub(crate) const DEFAULT_RELEASE: &str = "nightly";

/// Default flavor.
pub(crate) const DEFAULT_FLAVOR: &str = "macos";

/// Default template for the path of the release archive.
pub(crate) const DEFAULT_RELEASE_PATH: &str = "/neovim/neovim/releases/download/${release}/nvim-${flavor}.tar.gz";

/// Default template for the executable within the unpacked release (relative to the source directory).
pub(crate) const DEFAULT_LINK_SOURCE: &str = "nvim-${flavor}/bin/nvim";

/// Default template for the link (relative to the destination directory).
pub(crate) const DEFAULT_LINK_TARGET: &str = "bin/nvim";

/// The struct that holds the configuration loaded from a YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct Config {
    /// The directory the release gets unpacked into.
    pub(crate) source: Option<String>,
    /// The installation prefix.
    pub(crate) destination: Option<String>,
    /// The release (nightly, stable, etc.).
    pub(crate) release: Option<String>,
    /// The flavor (macos, linux64, etc.).
    pub(crate) flavor: Option<String>,
    /// The base URL.
    pub(crate) url: Option<String>,
    /// The fetch timeout (humantime syntax).
    pub(crate) timeout: Option<String>,
    /// Template for the path of the release archive.
    pub(crate) release_path: Option<String>,
    /// Template for the executable within the unpacked release.
    pub(crate) link_source: Option<String>,
    /// Template for the link.
    pub(crate) link_target: Option<String>,
}

impl Config {
    /// Loads the configuration from the given filename.
    #[instrument(err, level = "trace")]
    pub(crate) fn load_from_file<P>(filename: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        let config_file = File::open(filename)?;

        let de = serde_yaml::Deserializer::from_reader(config_file);
        let value = serde_yaml::Value::deserialize(de)?;
        // an empty file is a valid (empty) configuration
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_value(value)?;

        Ok(config)
    }
}

/// The immutable options for a single installation.
#[derive(Debug, PartialEq)]
pub(crate) struct Options {
    /// The directory the release gets unpacked into.
    pub(crate) source: PathBuf,
    /// The installation prefix.
    pub(crate) destination: PathBuf,
    /// The release.
    pub(crate) release: String,
    /// The flavor.
    pub(crate) flavor: String,
    /// The base URL.
    pub(crate) url: String,
    /// The fetch timeout.
    pub(crate) timeout: Option<Duration>,
    /// The path of the release archive (on the server).
    pub(crate) release_path: String,
    /// The executable to link to.
    pub(crate) link_source: PathBuf,
    /// The link to create.
    pub(crate) link_target: PathBuf,
}

impl Options {
    /// Resolves the options with command line over configuration over defaults.
    ///
    /// Relative directories from the command line are resolved against `cwd`, those from the configuration against `basedir`.
    #[instrument(err, level = "trace")]
    pub(crate) fn resolve(args: &Args, config: &Config, basedir: &Path, cwd: &Path) -> anyhow::Result<Self> {
        let release = pick(&args.release, &config.release, DEFAULT_RELEASE);
        let flavor = pick(&args.flavor, &config.flavor, DEFAULT_FLAVOR);
        let url = pick(&args.url, &config.url, DEFAULT_URL);

        let timeout = match (args.timeout, &config.timeout) {
            (Some(timeout), _) => Some(timeout),
            (None, Some(timeout)) => Some(humantime::parse_duration(timeout).with_context(|| format!("invalid timeout '{timeout}'"))?),
            (None, None) => None,
        };

        let expander = expander(&release, &flavor);

        let source = match (&args.source, &config.source) {
            (Some(source), _) => resolve_dir(&expander, source, cwd)?,
            (None, Some(source)) => resolve_dir(&expander, source, basedir)?,
            (None, None) => cwd.to_path_buf(),
        };
        let destination = match (&args.destination, &config.destination) {
            (Some(destination), _) => resolve_dir(&expander, destination, cwd)?,
            (None, Some(destination)) => resolve_dir(&expander, destination, basedir)?,
            (None, None) => PathBuf::from(DEFAULT_DESTINATION),
        };

        let release_path = config.release_path.as_deref().unwrap_or(DEFAULT_RELEASE_PATH);
        let release_path = expander.expand(release_path)?.into_owned();

        let link_source = config.link_source.as_deref().unwrap_or(DEFAULT_LINK_SOURCE);
        let link_source = source.join(&*expander.expand(link_source)?);

        let link_target = config.link_target.as_deref().unwrap_or(DEFAULT_LINK_TARGET);
        let link_target = destination.join(&*expander.expand(link_target)?);

        Ok(Self {
            source,
            destination,
            release,
            flavor,
            url,
            timeout,
            release_path,
            link_source,
            link_target,
        })
    }
}

// Picks the first present value (command line, configuration) or the default.
#[doc(hidden)]
fn pick(arg: &Option<String>, config: &Option<String>, default: &str) -> String {
    arg.as_ref().or(config.as_ref()).map_or_else(|| default.to_string(), Clone::clone)
}

// Sets up the expander for templates and directories.
#[doc(hidden)]
fn expander(release: &str, flavor: &str) -> VarExpander {
    let mut simple_var_resolver = SimpleVarResolver::new();
    simple_var_resolver.insert("release", release);
    simple_var_resolver.insert("flavor", flavor);
    simple_var_resolver.insert("os", env::consts::OS);
    simple_var_resolver.insert("arch", env::consts::ARCH);
    let os_env_var_resolver: Rc<dyn VarResolver> = Rc::new(OsEnvVarResolver);
    let prefixed_var_resolver = PrefixedVarResolver::new("env.", os_env_var_resolver.clone());
    let var_resolvers: Vec<Rc<dyn VarResolver>> = vec![Rc::new(simple_var_resolver), Rc::new(prefixed_var_resolver), os_env_var_resolver];

    VarExpander::new(var_resolvers)
}

// Expands `~` and variables in the directory and makes it absolute (relative to `basedir`).
#[doc(hidden)]
fn resolve_dir(expander: &VarExpander, dir: &str, basedir: &Path) -> anyhow::Result<PathBuf> {
    let dir = shellexpand::tilde(dir);
    let dir = expander.expand(&dir).with_context(|| format!("failed to expand '{dir}'"))?;

    Ok(basedir.join(&*dir))
}
