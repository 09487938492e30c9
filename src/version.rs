//! Version.
//!
//! This module contains the version information.

use std::fmt;

/// Structure to hold the version information.
#[derive(Debug)]
pub(crate) struct Version {
    /// The name of the package.
    pub(crate) pkg_name: &'static str,
    /// The version of the package.
    pub(crate) pkg_version: &'static str,
    /// The value that `git describe` returned.
    pub(crate) git_describe: &'static str,
    /// The version of the rust compiler.
    pub(crate) rustc_semver: &'static str,
    /// The host triple the binary was built on.
    pub(crate) rustc_host_triple: &'static str,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            pkg_name: env!("CARGO_PKG_NAME"),
            pkg_version: env!("CARGO_PKG_VERSION"),
            git_describe: env!("VERGEN_GIT_DESCRIBE"),
            rustc_semver: env!("VERGEN_RUSTC_SEMVER"),
            rustc_host_triple: env!("VERGEN_RUSTC_HOST_TRIPLE"),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            pkg_name,
            pkg_version,
            git_describe,
            rustc_semver,
            rustc_host_triple,
        } = self;
        write!(f, "{pkg_name} {pkg_version} (git/{git_describe}) (rustc/{rustc_semver} {rustc_host_triple})")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use test_log::test;

    #[test]
    fn display() {
        let version = Version {
            pkg_name: "nvim-installer",
            pkg_version: "1.2.3",
            git_describe: "v1.2.3-4-gabcdef",
            rustc_semver: "1.90.0",
            rustc_host_triple: "x86_64-unknown-linux-gnu",
        };
        assert_eq!(version.to_string(), "nvim-installer 1.2.3 (git/v1.2.3-4-gabcdef) (rustc/1.90.0 x86_64-unknown-linux-gnu)");
    }

    #[test]
    fn default_uses_package_name() {
        assert_eq!(Version::default().pkg_name, "nvim-installer");
    }
}
