//! Finding a TrueType font for label rendering tests.

use std::path::{Path, PathBuf};

/// Font the label tests draw with.
pub const LABEL_FONT: &str = "DejaVuSans.ttf";

const SYSTEM_FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/dejavu",
    "/usr/share/fonts/TTF",
];

/// Full path of an installed font file.
///
/// Looks in `$MAP_TEST_FONT_DIR`, then `testdata/` at the workspace root,
/// then the usual Linux font directories.
pub fn find_font(file_name: &str) -> Option<PathBuf> {
    let override_dir = std::env::var_os("MAP_TEST_FONT_DIR").map(PathBuf::from);
    let testdata = Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(|root| root.join("testdata"));

    override_dir
        .into_iter()
        .chain(testdata)
        .chain(SYSTEM_FONT_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join(file_name))
        .find(|path| path.is_file())
}
