use std::cmp::Ordering;

use jrm_runtime::{JavaVersion, LocalRuntime, Platform, RemoteRuntimeDescriptor, Vendor, VersionSpec};

/// Fully defaulted request as seen by the matcher.
#[derive(Debug, Clone)]
pub struct MatchCriteria {
    /// Acceptable versions, most preferred first. A candidate matching any of them is eligible.
    pub versions: Vec<VersionSpec>,
    pub vendor: Vendor,
    pub platform: Platform,
    /// Range the launcher supports regardless of what was requested.
    pub supported: VersionSpec,
    pub check_for_updates: bool,
}

impl MatchCriteria {
    /// Most specific requested spec matching `version`, if any.
    fn best_spec(&self, version: &JavaVersion) -> Option<&VersionSpec> {
        if !self.supported.matches(version) {
            return None;
        }
        let mut best: Option<&VersionSpec> = None;
        for spec in self.versions.iter().filter(|spec| spec.matches(version)) {
            match best {
                Some(current) if spec.compare_specificity(current) != Ordering::Greater => {}
                _ => best = Some(spec),
            }
        }
        best
    }

    fn rank(&self, version: &JavaVersion, vendor: &Vendor, platform: Platform) -> Option<Rank<'_>> {
        if platform != self.platform || !self.vendor.matches(vendor) {
            return None;
        }
        let spec = self.best_spec(version)?;
        Some(Rank {
            spec,
            version: version.clone(),
            exact_vendor: self.vendor.is_exact_match(vendor),
        })
    }
}

struct Rank<'a> {
    spec: &'a VersionSpec,
    version: JavaVersion,
    exact_vendor: bool,
}

impl Rank<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.spec
            .compare_specificity(other.spec)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.exact_vendor.cmp(&other.exact_vendor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    UseLocal(LocalRuntime),
    DownloadRemote {
        candidate: RemoteRuntimeDescriptor,
        /// Local runtime the download would replace when it came from an update check.
        supersedes: Option<LocalRuntime>,
    },
    NoMatch,
}

/// Highest ranked candidate; the earliest one wins ties.
fn best<'c, T>(
    candidates: &'c [T],
    rank: impl Fn(&'c T) -> Option<Rank<'c>>,
) -> Option<&'c T> {
    let mut winner: Option<(&T, Rank<'_>)> = None;
    for candidate in candidates {
        let Some(candidate_rank) = rank(candidate) else {
            continue;
        };
        match &winner {
            Some((_, current)) if candidate_rank.cmp(current) != Ordering::Greater => {}
            _ => winner = Some((candidate, candidate_rank)),
        }
    }
    winner.map(|(candidate, _)| candidate)
}

pub fn best_local<'c>(criteria: &'c MatchCriteria, local: &'c [LocalRuntime]) -> Option<&'c LocalRuntime> {
    best(local, |rt| criteria.rank(&rt.version, &rt.vendor, rt.platform))
}

pub fn best_remote<'c>(
    criteria: &'c MatchCriteria,
    remote: &'c [RemoteRuntimeDescriptor],
) -> Option<&'c RemoteRuntimeDescriptor> {
    best(remote, |rd| criteria.rank(&rd.version, &rd.vendor, rd.platform))
}

/// Choose between local and remote candidates.
///
/// A satisfying local runtime always wins unless `check_for_updates` is set
/// and the best remote candidate is strictly newer.
pub fn select(
    criteria: &MatchCriteria,
    local: &[LocalRuntime],
    remote: &[RemoteRuntimeDescriptor],
) -> Selection {
    let local_best = best_local(criteria, local);
    let remote_best = best_remote(criteria, remote);
    match (local_best, remote_best) {
        (Some(current), Some(candidate))
            if criteria.check_for_updates && candidate.version > current.version =>
        {
            Selection::DownloadRemote {
                candidate: candidate.clone(),
                supersedes: Some(current.clone()),
            }
        }
        (Some(current), _) => Selection::UseLocal(current.clone()),
        (None, Some(candidate)) => Selection::DownloadRemote {
            candidate: candidate.clone(),
            supersedes: None,
        },
        (None, None) => Selection::NoMatch,
    }
}
