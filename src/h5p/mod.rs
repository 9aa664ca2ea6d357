// H5P package handling
//
// - package: reading and writing the zip archive, content.json and h5p.json
// - fields: choosing which strings inside content.json get translated

pub mod fields;
pub mod package;

pub use fields::{apply_translations, select_fields, TranslatableField};
pub use package::{H5pPackage, PackageEntry, MANIFEST_PATH};
