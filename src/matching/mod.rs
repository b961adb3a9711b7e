//! Pure, in-memory identity matching: normalization keys and fuzzy scoring.

pub mod normalize;
pub mod similarity;
pub mod title;

pub use normalize::{normalize_author_name, normalize_title, split_subtitle, title_forms};
pub use title::{TitleCandidate, TitleIndex, TitleMatch, TitleMatcher};
