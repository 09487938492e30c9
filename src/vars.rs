//! Variable resolvers.
//!
//! This module contains basic support for variable resolvers and an expander to resolve variables in templates.

use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::rc::Rc;

// Upper bound of expansion rounds (values may contain variables themselves).
#[doc(hidden)]
const MAX_EXPANSION_ROUNDS: usize = 16;

/// The error type for operations interacting with variables.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Debug, thiserror::Error)]
pub(crate) enum VarError {
    /// The specified variable is not present.
    #[error("variable '{0}' not found")]
    NotPresent(String),
    /// The expansion did not settle (a variable refers to itself).
    #[error("recursive variable expansion in '{0}'")]
    Recursion(String),
}

/// Trait for variable resolvers.
pub(crate) trait VarResolver: fmt::Debug {
    /// Resolves the variable with the given name.
    fn resolve_var(&self, var_name: &str) -> Result<String, VarError>;
}

/// [`VarResolver`] implementation that combines other variable resolvers (first match wins).
#[derive(Debug)]
pub(crate) struct CombinedVarResolver {
    resolvers: Vec<Rc<dyn VarResolver>>,
}

impl CombinedVarResolver {
    /// Constructs a new `CombinedVarResolver` with the given variable resolvers.
    pub(crate) fn new<I>(resolvers: I) -> Self
    where
        I: IntoIterator<Item = Rc<dyn VarResolver>>,
    {
        Self {
            resolvers: Vec::from_iter(resolvers),
        }
    }
}

impl VarResolver for CombinedVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        for resolver in &self.resolvers {
            if let Ok(value) = resolver.resolve_var(v) {
                return Ok(value);
            }
        }

        Err(VarError::NotPresent(v.to_owned()))
    }
}

/// [`VarResolver`] implementation for environment variables from the operating system.
#[derive(Debug)]
pub(crate) struct OsEnvVarResolver;

impl VarResolver for OsEnvVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        env::var(v).map_err(|_| VarError::NotPresent(v.to_owned()))
    }
}

/// [`VarResolver`] that first removes the given prefix from the variable and then delegates to the given resolver.
#[derive(Debug)]
pub(crate) struct PrefixedVarResolver {
    resolver: Rc<dyn VarResolver>,
    prefix: String,
}

impl PrefixedVarResolver {
    /// Constructs a new `PrefixedVarResolver` for the given variable resolver.
    pub(crate) fn new(prefix: impl Into<String>, resolver: Rc<dyn VarResolver>) -> Self {
        Self {
            prefix: prefix.into(),
            resolver,
        }
    }
}

impl VarResolver for PrefixedVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        if let Some(v) = v.strip_prefix(&self.prefix) {
            return self.resolver.resolve_var(v);
        };

        Err(VarError::NotPresent(v.to_owned()))
    }
}

/// [`VarResolver`] implementation for simple variables.
#[derive(Debug, Default)]
pub(crate) struct SimpleVarResolver {
    vars: HashMap<String, String>,
}

impl SimpleVarResolver {
    /// Constructs a new `SimpleVarResolver`.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers the value for the given variable name.
    pub(crate) fn insert(&mut self, name: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(name.into(), val.into());
    }
}

impl VarResolver for SimpleVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        match self.vars.get(v) {
            Some(value) => Ok(value.clone()),
            _ => Err(VarError::NotPresent(v.to_owned())),
        }
    }
}

/// Expands variables in strings with the help of variable resolvers.
#[derive(Debug)]
pub(crate) struct VarExpander {
    #[doc(hidden)]
    resolver: CombinedVarResolver,
}

impl VarExpander {
    /// Constructs a new `VarExpander` with the given variable resolvers.
    pub(crate) fn new<I>(resolvers: I) -> Self
    where
        I: IntoIterator<Item = Rc<dyn VarResolver>>,
    {
        Self {
            resolver: CombinedVarResolver::new(resolvers),
        }
    }

    /// Expands all known variables in the given string (repeatedly, until nothing changes anymore).
    #[tracing::instrument(level = "trace", ret)]
    pub(crate) fn expand<'a, S>(&self, s: &'a S) -> Result<Cow<'a, str>, VarError>
    where
        S: ?Sized + AsRef<str> + fmt::Debug,
    {
        let s: &str = s.as_ref();
        let mut current = Cow::Borrowed(s);
        for _ in 0..MAX_EXPANSION_ROUNDS {
            let expanded = shellexpand::env_with_context(&current, |v| self.resolve(v)) //
                .map_err(|err| err.cause)? //
                .into_owned();
            if expanded == current {
                return Ok(current);
            }
            current = Cow::Owned(expanded);
        }

        Err(VarError::Recursion(s.to_owned()))
    }

    // Provides the context for `expand`.
    #[doc(hidden)]
    fn resolve(&self, v: &str) -> Result<Option<String>, VarError> {
        self.resolver.resolve_var(v).map(Option::Some)
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use test_log::test;

    fn simple(vars: &[(&str, &str)]) -> Rc<dyn VarResolver> {
        let mut resolver = SimpleVarResolver::new();
        for (name, val) in vars {
            resolver.insert(*name, *val);
        }
        Rc::new(resolver)
    }

    #[test]
    fn os_env_var_resolver_known_var() {
        let path = env::var("PATH").unwrap();
        let resolver = OsEnvVarResolver;
        assert_eq!(resolver.resolve_var("PATH").unwrap(), path);
    }

    #[test]
    fn os_env_var_resolver_unknown_var() {
        let resolver = OsEnvVarResolver;
        let resolved = resolver.resolve_var("NVIM_INSTALLER_SURELY_NOT_SET");
        assert_eq!(resolved, Err(VarError::NotPresent("NVIM_INSTALLER_SURELY_NOT_SET".to_string())));
    }

    #[test]
    fn prefixed_var_resolver() {
        let resolver = PrefixedVarResolver::new("env.", simple(&[("FOO", "bar")]));
        assert_eq!(resolver.resolve_var("env.FOO").unwrap(), "bar");
        assert!(resolver.resolve_var("FOO").is_err());
    }

    #[test]
    fn combined_var_resolver_first_wins() {
        let resolver = CombinedVarResolver::new([simple(&[("a", "1")]), simple(&[("a", "2"), ("b", "3")])]);
        assert_eq!(resolver.resolve_var("a").unwrap(), "1");
        assert_eq!(resolver.resolve_var("b").unwrap(), "3");
        assert!(resolver.resolve_var("c").is_err());
    }

    #[test]
    fn expand_release_path() {
        let expander = VarExpander::new([simple(&[("release", "nightly"), ("flavor", "macos")])]);
        let expanded = expander.expand("/neovim/neovim/releases/download/${release}/nvim-${flavor}.tar.gz").unwrap();
        assert_eq!(expanded, "/neovim/neovim/releases/download/nightly/nvim-macos.tar.gz");
    }

    #[test]
    fn expand_without_variables_borrows() {
        let expander = VarExpander::new(Vec::<Rc<dyn VarResolver>>::new());
        let expanded = expander.expand("bin/nvim").unwrap();
        assert!(matches!(expanded, Cow::Borrowed("bin/nvim")));
    }

    #[test]
    fn expand_nested() {
        let expander = VarExpander::new([simple(&[("dir", "nvim-${flavor}"), ("flavor", "linux64")])]);
        assert_eq!(expander.expand("${dir}/bin/nvim").unwrap(), "nvim-linux64/bin/nvim");
    }

    #[test]
    fn expand_unknown() {
        let expander = VarExpander::new([simple(&[])]);
        assert_eq!(expander.expand("${nope}"), Err(VarError::NotPresent("nope".to_string())));
    }

    #[test]
    fn expand_recursive() {
        let expander = VarExpander::new([simple(&[("a", "x${a}")])]);
        assert_eq!(expander.expand("${a}"), Err(VarError::Recursion("${a}".to_string())));
    }
}
