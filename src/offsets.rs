//! Absolute page numbering of the assembled document.

use log::debug;

use crate::model::DocumentParts;

/// Numbers the parts in output order starting at page 1 and returns the total page count.
///
/// Must only run once the TOC has been frozen, since its page count shifts every body part.
pub fn assign_page_offsets(parts: &mut DocumentParts) -> usize {
    let mut next = 1;
    for part in parts.ordered_mut() {
        part.set_start_page(next);
        debug!(
            "Part '{}' starts at page {} ({} page(s))",
            part.id(),
            next,
            part.page_count()
        );
        next += part.page_count();
    }
    next - 1
}
