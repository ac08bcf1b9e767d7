use time::OffsetDateTime;

/// Half-open booking interval `[start, end)`. No end means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalWindow {
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
}

impl RentalWindow {
    pub fn is_active_at(&self, t: OffsetDateTime) -> bool {
        self.start <= t && self.end.map_or(true, |end| end > t)
    }

    pub fn overlaps(&self, other: &RentalWindow) -> bool {
        let starts_before_other_ends = other.end.map_or(true, |end| self.start < end);
        let other_starts_before_self_ends = self.end.map_or(true, |end| other.start < end);
        starts_before_other_ends && other_starts_before_self_ends
    }
}

/// True when none of `windows` is active at `as_of`.
pub fn is_free_at<'a>(
    mut windows: impl Iterator<Item = &'a RentalWindow>,
    as_of: OffsetDateTime,
) -> bool {
    !windows.any(|w| w.is_active_at(as_of))
}

/// First of `existing` that overlaps `requested`.
pub fn first_conflict<'a>(
    existing: impl IntoIterator<Item = &'a RentalWindow>,
    requested: &RentalWindow,
) -> Option<&'a RentalWindow> {
    existing.into_iter().find(|w| w.overlaps(requested))
}
