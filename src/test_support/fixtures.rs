//! Test fixtures for common test scenarios.
//!
//! Recipes used across unit tests, plus helpers that write a small
//! self-contained package (tarball, patches, recipe) into a directory.

use std::path::{Path, PathBuf};

use crate::core::host::{CompilerFacts, CompilerFamily, HostFacts, OsFamily};
use crate::util::hash::sha256_str;

/// A real-world recipe with two variants, conditional patches and
/// toolchain constraints.
pub const GRAPH_TOOL_RECIPE: &str = include_str!("../../tests/fixtures/graph-tool.toml");

/// The smallest useful recipe: one stable source, configure and install.
pub const MINIMAL_RECIPE: &str = r#"
name = "hello"
desc = "GNU hello"
homepage = "https://www.gnu.org/software/hello/"
version = "1.0"

[[source]]
url = "https://example.com/hello-1.0.tar.gz"
sha256 = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"

[build]
configure = ["./configure", "--prefix={prefix}"]
install = "make install"
"#;

/// A recipe with two unconditional patches and three unconditional variants.
pub fn three_variant_recipe() -> String {
    format!(
        r#"
name = "hello"
version = "1.0"

[[source]]
url = "https://example.com/hello-1.0.tar.gz"
sha256 = "{a}"

[[patch]]
url = "https://example.com/fix-build.diff"
sha256 = "{b}"

[[patch]]
url = "https://example.com/fix-tests.diff"
sha256 = "{c}"
strip = 0

[build]
configure = "./configure --prefix={{prefix}}"
compile = "make -j{{jobs}}"
install = "make install"

[[variant]]
name = "shared"
configure_args = ["--enable-shared"]

[[variant]]
name = "static"
configure_args = ["--disable-shared"]

[[variant]]
name = "debug"
configure_args = ["--enable-debug"]
"#,
        a = "a".repeat(64),
        b = "b".repeat(64),
        c = "c".repeat(64),
    )
}

/// A Linux host with a modern GCC.
pub fn linux_gcc() -> HostFacts {
    HostFacts::new(
        OsFamily::Linux,
        CompilerFacts::new(CompilerFamily::Gcc, "9.4.0".parse().unwrap())
            .with_feature("openmp"),
    )
}

/// Files of a package written by [`write_local_package`].
#[derive(Debug, Clone)]
pub struct LocalPackage {
    pub recipe: PathBuf,
    pub tarball: PathBuf,
    pub patch: PathBuf,
}

/// Write a recipe whose source and patch are local files next to it.
///
/// The tarball and patch are placeholders: they are only ever handed to a
/// mock runner. `test_run` becomes the smoke test command.
pub fn write_local_package(dir: &Path, test_run: &str) -> LocalPackage {
    let tarball_body = "hello-1.0 tarball";
    let patch_body = "--- a/configure\n+++ b/configure\n";
    let tarball = dir.join("hello-1.0.tar.gz");
    let patch = dir.join("fix-build.diff");
    std::fs::write(&tarball, tarball_body).unwrap();
    std::fs::write(&patch, patch_body).unwrap();

    let text = format!(
        r#"
name = "hello"
version = "1.0"

[[source]]
url = "hello-1.0.tar.gz"
sha256 = "{source_sha}"

[[patch]]
url = "fix-build.diff"
sha256 = "{patch_sha}"

[build]
configure = "./configure --prefix={{prefix}}"
install = "make install"

[test]
run = "{test_run}"

[test.files]
"greeting.txt" = "Hello, world!"
"#,
        source_sha = sha256_str(tarball_body),
        patch_sha = sha256_str(patch_body),
        test_run = test_run,
    );
    let recipe = dir.join("hello.toml");
    std::fs::write(&recipe, text).unwrap();

    LocalPackage {
        recipe,
        tarball,
        patch,
    }
}
