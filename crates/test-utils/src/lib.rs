//! Test support shared by the map viewer crates: a sample grid, a
//! visualization that counts its renders, and label font lookup.

pub mod counting;
pub mod fixtures;
pub mod fonts;

pub use counting::*;
pub use fixtures::*;
pub use fonts::*;

/// Path of the label font, or return early from the test when no font is
/// installed.
///
/// ```ignore
/// let font = test_utils::require_font!();
/// let decorator = Decorator::from_font_path(Some(&font))?;
/// ```
#[macro_export]
macro_rules! require_font {
    () => {
        $crate::require_font!($crate::LABEL_FONT)
    };
    ($file_name:expr) => {
        match $crate::find_font($file_name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "skipping: font {} not installed, set MAP_TEST_FONT_DIR to run this test",
                    $file_name
                );
                return;
            }
        }
    };
}
