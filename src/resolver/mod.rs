//! npm range handling on top of the `semver` crate.
//!
//! `semver::VersionReq` speaks Cargo's dialect, so npm ranges are first
//! canonicalized (bare versions become exact, whitespace-separated comparators
//! get commas, x-ranges and hyphen ranges are expanded) and `||` alternatives are
//! kept as separate requirements.

use semver::{Comparator, Op, Version, VersionReq};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

mod sets;
pub mod spec;

pub use sets::{compute_compatible_sets, max_satisfying_all_in_group, nice_max};
pub use spec::{ResolvedVersion, VersionSpec};

/// A parsed npm range: one or more `||` alternatives.
#[derive(Debug, Clone)]
pub struct NpmRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    pub fn parse(input: &str) -> Option<Self> {
        let raw = input.trim();
        let mut alternatives = Vec::new();
        for part in raw.split("||").map(str::trim) {
            let canonical = canonicalize_npm_range(part);
            let req = if canonical == "*" {
                VersionReq::STAR
            } else {
                VersionReq::from_str(&canonical).ok()?
            };
            alternatives.push(req);
        }
        if alternatives.is_empty() {
            return None;
        }
        Some(Self { raw: raw.to_string(), alternatives })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|r| r.matches(version))
    }

    pub fn max_satisfying<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions.into_iter().filter(|v| self.satisfies(v)).max()
    }

    /// True when some version could satisfy both ranges.
    pub fn intersects(&self, other: &NpmRange) -> bool {
        self.alternatives.iter().any(|a| {
            let a = Interval::from_req(a);
            other.alternatives.iter().any(|b| !a.clone().intersect(Interval::from_req(b)).is_empty())
        })
    }
}

impl PartialEq for NpmRange {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for NpmRange {}

impl fmt::Display for NpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn canonicalize_npm_range(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() || s == "*" || s == "latest" || s.eq_ignore_ascii_case("x") {
        return "*".into();
    }

    // Hyphen range: "1.2.3 - 2.3.4" => ">=1.2.3, <=2.3.4"
    if let Some((left, right)) = s.split_once(" - ") {
        let (left, right) = (left.trim(), right.trim());
        if is_version_like(left) && is_version_like(right) {
            let lower = format!(">={}", strip_v(left));
            let upper = match partial_upper(strip_v(right)) {
                Some(exclusive) => format!("<{exclusive}"),
                None => format!("<={}", strip_v(right)),
            };
            return format!("{lower}, {upper}");
        }
    }

    // Glue lone operators to the version that follows them.
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in s.split_whitespace().flat_map(|t| t.split(',')).filter(|t| !t.is_empty()) {
        if is_op(token) {
            pending_op = Some(token);
            continue;
        }
        if let Some(op) = pending_op.take() {
            comparators.push(format!("{op}{}", strip_v(token)));
            continue;
        }
        if token.starts_with(['<', '>', '=', '~', '^']) {
            comparators.push(token.to_string());
            continue;
        }
        if !is_version_like(token) {
            // Leave it to the semver parser to reject.
            return s.to_string();
        }
        if let Some(expanded) = expand_bare(strip_v(token)) {
            comparators.push(expanded);
        }
    }
    if pending_op.is_some() {
        return s.to_string();
    }
    if comparators.is_empty() {
        return "*".into();
    }
    comparators.join(", ")
}

fn is_op(t: &str) -> bool {
    matches!(t, ">" | "<" | ">=" | "<=" | "=" | "^" | "~")
}

fn strip_v(t: &str) -> &str {
    t.strip_prefix('v').or_else(|| t.strip_prefix('V')).unwrap_or(t)
}

fn is_version_like(t: &str) -> bool {
    let t = strip_v(t);
    let mut has_digit_or_wild = false;
    for c in t.chars() {
        if c.is_ascii_digit() || matches!(c, 'x' | 'X' | '*') {
            has_digit_or_wild = true;
            continue;
        }
        if !matches!(c, '.' | '-' | '+' | 'a'..='z' | 'A'..='Z') {
            return false;
        }
    }
    has_digit_or_wild && t.starts_with(|c: char| c.is_ascii_digit() || matches!(c, 'x' | 'X' | '*'))
}

fn is_wild(part: &str) -> bool {
    part.eq_ignore_ascii_case("x") || part == "*"
}

/// A bare token in npm means "exactly" for full versions and an x-range otherwise.
/// Returns `None` when the token matches everything.
fn expand_bare(t: &str) -> Option<String> {
    if Version::parse(t).is_ok() {
        return Some(format!("={t}"));
    }
    let parts: Vec<&str> = t.split('.').collect();
    if parts.iter().any(|p| !is_wild(p) && p.parse::<u64>().is_err()) {
        // Not an x-range; let the semver parser reject it.
        return Some(format!("={t}"));
    }
    let nums: Vec<Option<u64>> = parts
        .iter()
        .map(|p| if is_wild(p) { None } else { p.parse::<u64>().ok() })
        .collect();
    match nums.as_slice() {
        [None, ..] => None,
        [Some(maj)] | [Some(maj), None] | [Some(maj), None, _] => {
            Some(format!(">={maj}.0.0, <{}.0.0", maj + 1))
        }
        [Some(maj), Some(min)] | [Some(maj), Some(min), None] => {
            Some(format!(">={maj}.{min}.0, <{maj}.{}.0", min + 1))
        }
        _ => Some(format!("={t}")),
    }
}

/// Exclusive upper bound for a partial hyphen-range end ("2" => "3.0.0").
fn partial_upper(t: &str) -> Option<String> {
    if Version::parse(t).is_ok() {
        return None;
    }
    let parts: Vec<&str> = t.split('.').collect();
    let maj = parts.first()?.parse::<u64>().ok()?;
    match parts.get(1).filter(|p| !is_wild(p)) {
        None => Some(format!("{}.0.0", maj + 1)),
        Some(min) => {
            let min = min.parse::<u64>().ok()?;
            Some(format!("{maj}.{}.0", min + 1))
        }
    }
}

/// Version interval a requirement admits, ignoring prerelease gating.
#[derive(Debug, Clone)]
struct Interval {
    /// (bound, inclusive)
    lower: Option<(Version, bool)>,
    upper: Option<(Version, bool)>,
}

impl Interval {
    fn full() -> Self {
        Self { lower: None, upper: None }
    }

    fn from_req(req: &VersionReq) -> Self {
        req.comparators
            .iter()
            .map(Interval::from_comparator)
            .fold(Interval::full(), Interval::intersect)
    }

    fn from_comparator(c: &Comparator) -> Self {
        let major = c.major;
        let floor = Version {
            major,
            minor: c.minor.unwrap_or(0),
            patch: c.patch.unwrap_or(0),
            pre: c.pre.clone(),
            build: semver::BuildMetadata::EMPTY,
        };
        let bump = match (c.minor, c.patch) {
            (None, _) => Version::new(major + 1, 0, 0),
            (Some(min), None) => Version::new(major, min + 1, 0),
            (Some(min), Some(patch)) => Version::new(major, min, patch + 1),
        };
        let exact = c.patch.is_some();
        let at_least = |v: Version| Some((v, true));
        let below = |v: Version| Some((v, false));
        match c.op {
            Op::Exact if exact => Self { lower: at_least(floor.clone()), upper: Some((floor, true)) },
            Op::Exact | Op::Wildcard => Self { lower: at_least(floor), upper: below(bump) },
            Op::Greater if exact => Self { lower: Some((floor, false)), upper: None },
            Op::Greater => Self { lower: at_least(bump), upper: None },
            Op::GreaterEq => Self { lower: at_least(floor), upper: None },
            Op::Less => Self { lower: None, upper: below(floor) },
            Op::LessEq if exact => Self { lower: None, upper: Some((floor, true)) },
            Op::LessEq => Self { lower: None, upper: below(bump) },
            Op::Tilde => {
                let upper = match c.minor {
                    Some(min) => Version::new(major, min + 1, 0),
                    None => Version::new(major + 1, 0, 0),
                };
                Self { lower: at_least(floor), upper: below(upper) }
            }
            Op::Caret => {
                let upper = match (major, c.minor, c.patch) {
                    (m, _, _) if m > 0 => Version::new(m + 1, 0, 0),
                    (_, None, _) => Version::new(1, 0, 0),
                    (_, Some(min), _) if min > 0 => Version::new(0, min + 1, 0),
                    (_, Some(_), None) => Version::new(0, 1, 0),
                    (_, Some(_), Some(patch)) => Version::new(0, 0, patch + 1),
                };
                Self { lower: at_least(floor), upper: below(upper) }
            }
            _ => Self::full(),
        }
    }

    fn intersect(self, other: Interval) -> Interval {
        let lower = match (self.lower, other.lower) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => Some(match a.0.cmp(&b.0) {
                Ordering::Greater => a,
                Ordering::Less => b,
                Ordering::Equal => (a.0, a.1 && b.1),
            }),
        };
        let upper = match (self.upper, other.upper) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => Some(match a.0.cmp(&b.0) {
                Ordering::Less => a,
                Ordering::Greater => b,
                Ordering::Equal => (a.0, a.1 && b.1),
            }),
        };
        Interval { lower, upper }
    }

    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some((lo, lo_inc)), Some((hi, hi_inc))) => match lo.cmp(hi) {
                Ordering::Greater => true,
                Ordering::Equal => !(*lo_inc && *hi_inc),
                Ordering::Less => false,
            },
            _ => false,
        }
    }
}
