//! Parser module: specification documents into a [`SpecDocument`].

pub mod params;
pub mod reqif;

use crate::model::SpecDocument;
use std::path::Path;

/// Parse a specification file. ReqIF is the only supported export format;
/// the extension is not checked because exports come as `.reqif` and `.xml`.
pub fn parse_file(path: &Path) -> SpecDocument {
    reqif::parse_file(path)
}
