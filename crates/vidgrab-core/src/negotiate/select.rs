//! Choosing one candidate against the preferred quality.

use crate::model::{Quality, QualityCandidate};

/// Best candidate for `preferred` among those with the given `secondary` tag.
///
/// The best tier that does not exceed the preference; when every tier is above
/// it, the best tier overall. Among equal tiers the earliest candidate wins.
pub fn select_candidate(
    candidates: &[QualityCandidate],
    preferred: Quality,
    secondary: bool,
) -> Option<&QualityCandidate> {
    let pool = || candidates.iter().filter(move |c| c.secondary == secondary);

    let within = pool()
        .filter(|c| c.quality <= preferred)
        .map(|c| c.quality)
        .max();
    let tier = within.or_else(|| pool().map(|c| c.quality).max())?;
    pool().find(|c| c.quality == tier)
}
