/// Source drawn into area `area_index`
///
/// Areas cycle over the sources in registration order (`area_index mod
/// source_count`). `None` when there are no sources.
pub fn source_index_for_area(area_index: usize, source_count: usize) -> Option<usize> {
    area_index.checked_rem(source_count)
}
