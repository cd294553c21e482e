//! Grouping of requested specs into sets that one installed version can serve.

use super::{ResolvedVersion, VersionSpec};
use crate::error::{Error, Result};
use semver::Version;

/// Partition specs into groups whose ranges pairwise intersect.
///
/// Each range joins the first group all of whose members intersect it, or
/// opens a new group. URL (and alias) specs are never grouped with ranges:
/// every distinct literal becomes its own singleton group, after the ranges.
pub fn compute_compatible_sets(specs: &[VersionSpec]) -> Vec<Vec<VersionSpec>> {
    let mut sets: Vec<Vec<VersionSpec>> = Vec::new();
    let mut literals: Vec<VersionSpec> = Vec::new();

    for spec in specs {
        let Some(range) = spec.as_range() else {
            if !literals.contains(spec) {
                literals.push(spec.clone());
            }
            continue;
        };
        let home = sets.iter_mut().find(|set| {
            set.iter().all(|member| member.as_range().is_some_and(|m| m.intersects(range)))
        });
        match home {
            Some(set) => {
                if !set.contains(spec) {
                    set.push(spec.clone());
                }
            }
            None => sets.push(vec![spec.clone()]),
        }
    }

    sets.extend(literals.into_iter().map(|l| vec![l]));
    sets
}

/// The version that serves every range of a compatible group: the lowest of
/// the per-range maxima.
///
/// `Ok(None)` when some range in the group has no satisfying version.
pub fn max_satisfying_all_in_group(
    available: &[Version],
    group: &[VersionSpec],
) -> Result<Option<ResolvedVersion>> {
    let Some(first) = group.first() else {
        return Ok(None);
    };
    if first.as_range().is_none() {
        if group.len() != 1 {
            let all: Vec<&str> = group.iter().map(VersionSpec::raw).collect();
            return Err(Error::Invariant(format!(
                "didn't expect several urls in one set: {}",
                all.join(", ")
            )));
        }
        return Ok(Some(ResolvedVersion::Url(first.raw().to_string())));
    }

    let mut lowest: Option<&Version> = None;
    for spec in group {
        let Some(range) = spec.as_range() else {
            return Err(Error::Invariant(format!("url {} grouped with ranges", spec.raw())));
        };
        match range.max_satisfying(available) {
            Some(pick) => {
                if lowest.map_or(true, |l| pick < l) {
                    lowest = Some(pick);
                }
            }
            None => return Ok(None),
        }
    }
    Ok(lowest.map(|v| ResolvedVersion::Semver(v.clone())))
}

/// Highest semver candidate, or the single URL when there is no semver one.
pub fn nice_max(candidates: &[ResolvedVersion]) -> Result<Option<ResolvedVersion>> {
    if let Some(best) = candidates.iter().filter_map(ResolvedVersion::as_semver).max() {
        return Ok(Some(ResolvedVersion::Semver(best.clone())));
    }
    match candidates {
        [] => Ok(None),
        [only] => Ok(Some(only.clone())),
        _ => Err(Error::Invariant(format!(
            "urls are not comparable: {}",
            candidates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ))),
    }
}
