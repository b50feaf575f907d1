use super::SelectionError;

/// Pick exactly one candidate.
///
/// A requested name selects the candidate carrying it, whatever else is there.
/// Without a request there must be exactly one candidate; zero or several is
/// an error rather than a silent default. An empty request counts as none.
pub fn select_exactly_one<I, T, F>(
    candidates: I,
    requested: Option<&str>,
    name_of: F,
) -> Result<T, SelectionError>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &str,
{
    let requested = requested.filter(|r| !r.is_empty());
    let mut seen = Vec::new();
    for candidate in candidates {
        match requested {
            Some(wanted) if name_of(&candidate) == wanted => return Ok(candidate),
            Some(_) => {}
            None => seen.push(candidate),
        }
    }
    if let Some(wanted) = requested {
        return Err(SelectionError::NotFound(wanted.to_string()));
    }
    match seen.len() {
        0 => Err(SelectionError::Absent),
        1 => Ok(seen.remove(0)),
        _ => Err(SelectionError::Ambiguous(
            seen.iter().map(|c| name_of(c).to_string()).collect(),
        )),
    }
}
