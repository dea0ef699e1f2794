/// Trimmed, non-empty lines of every page, in reading order. Pages without
/// text contribute nothing.
pub fn scan_lines(pages: &[Option<String>]) -> impl Iterator<Item = &str> {
    pages
        .iter()
        .flatten()
        .flat_map(|page| page.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
}
