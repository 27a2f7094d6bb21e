use std::collections::BTreeSet;

use url::Url;

use crate::model::{EvidenceTier, MemberRow, SourceClass};

/// Cluster composition the tier is derived from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Composition {
    pub items: usize,
    pub domains: BTreeSet<String>,
    pub classes: BTreeSet<SourceClass>,
}

impl Composition {
    pub fn from_members(members: &[MemberRow]) -> Self {
        let mut comp = Composition::default();
        for m in members {
            comp.push(m);
        }
        comp
    }

    pub fn push(&mut self, m: &MemberRow) {
        self.items += 1;
        let url = m.final_url.as_deref().filter(|u| !u.trim().is_empty()).unwrap_or(&m.url);
        if let Some(d) = domain_of(url) { self.domains.insert(d); }
        self.classes.insert(m.source_class);
    }
}

/// Host of `url`, lowercased, without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() { None } else { Some(host) }
}

/// Promotion rules, checked top-down:
/// - `Confirmed`: 3+ items and 2+ editorial classes
/// - `Strong`: an official source, or 2+ items across 2+ domains
/// - `Corroborated`: 2+ items, or 2+ domains
/// - `Unverified`: anything else
///
/// Every rule is monotone in the composition, so adding an item never lowers the tier.
pub fn score(comp: &Composition) -> EvidenceTier {
    let n = comp.items;
    let domains = comp.domains.len();
    let classes = comp.classes.len();

    if n >= 3 && classes >= 2 {
        EvidenceTier::Confirmed
    } else if comp.classes.contains(&SourceClass::Official) || (n >= 2 && domains >= 2) {
        EvidenceTier::Strong
    } else if n >= 2 || domains >= 2 {
        EvidenceTier::Corroborated
    } else {
        EvidenceTier::Unverified
    }
}

pub fn score_members(members: &[MemberRow]) -> EvidenceTier { score(&Composition::from_members(members)) }
