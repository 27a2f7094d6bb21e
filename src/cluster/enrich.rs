/// Titles shorter than this are considered uninformative and may be replaced.
pub const MIN_INFORMATIVE_TITLE: usize = 20;

/// Descriptive fields of an event that clustering may fill in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Descriptors {
    pub title: String,
    pub region: String,
    pub topic: String,
}

/// Monotonic enrichment of `current` from a candidate. Populated fields never
/// become blank or shorter. Returns `None` when nothing changes.
pub fn enrich(current: &Descriptors, cand: &Descriptors) -> Option<Descriptors> {
    let mut next = current.clone();

    if current.region.trim().is_empty() && !cand.region.trim().is_empty() {
        next.region = cand.region.clone();
    }
    if current.topic.trim().is_empty() && !cand.topic.trim().is_empty() {
        next.topic = cand.topic.clone();
    }

    let cur_len = current.title.chars().count();
    let weak = current.title.trim().is_empty() || cur_len < MIN_INFORMATIVE_TITLE;
    if weak && cand.title.chars().count() > cur_len {
        next.title = cand.title.clone();
    }

    if next == *current { None } else { Some(next) }
}
