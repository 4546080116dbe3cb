//! A1-notation helpers.
//!
//! Column indices are zero-based (`A` = 0); row numbers are one-based, as
//! in the spreadsheet UI.

/// Column letters for a zero-based index: 0 → `A`, 25 → `Z`, 26 → `AA`.
#[must_use]
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = u8::try_from((n - 1) % 26).unwrap_or(0);
        letters.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Zero-based index for column letters (case-insensitive).
///
/// Returns `None` for an empty or non-alphabetic input.
#[must_use]
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}

/// Quote a tab name when it contains anything besides letters, digits and `_`.
#[must_use]
pub fn quote_tab(tab: &str) -> String {
    if !tab.is_empty() && tab.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        tab.to_string()
    } else {
        format!("'{}'", tab.replace('\'', "''"))
    }
}

/// Join a tab and a cell range: `Tab!A2:M`.
#[must_use]
pub fn range(tab: &str, cells: &str) -> String {
    format!("{}!{cells}", quote_tab(tab))
}

/// Full-column range for one column of a tab: `Tab!K:K`.
#[must_use]
pub fn column_range(tab: &str, column: usize) -> String {
    let letters = column_letters(column);
    range(tab, &format!("{letters}:{letters}"))
}

/// Single-cell range: `Tab!A7:A7`.
#[must_use]
pub fn cell_range(tab: &str, column: usize, row: usize) -> String {
    let letters = column_letters(column);
    range(tab, &format!("{letters}{row}:{letters}{row}"))
}

/// Split `Tab!A2:M` into the unquoted tab and the cell part.
///
/// A range without `!` is a bare tab name.
#[must_use]
pub fn split_range(range: &str) -> (String, Option<&str>) {
    let (tab, cells) = match range.rfind('!') {
        Some(pos) => (&range[..pos], Some(&range[pos + 1..])),
        None => (range, None),
    };
    let tab = tab
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .map_or_else(|| tab.to_string(), |t| t.replace("''", "'"));
    (tab, cells)
}

/// One end of a cell range; either part may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub column: Option<usize>,
    pub row: Option<usize>,
}

/// Parse a single reference like `A2`, `M` or `7`.
#[must_use]
pub fn parse_cell(cell: &str) -> Option<CellRef> {
    let cell = cell.trim();
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let column = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse().ok()?)
    };
    if column.is_none() && row.is_none() {
        return None;
    }
    Some(CellRef { column, row })
}

/// Parse `A2:M` into its start and end references.
///
/// A single reference yields the same start and end.
#[must_use]
pub fn parse_cells(cells: &str) -> Option<(CellRef, CellRef)> {
    match cells.split_once(':') {
        Some((start, end)) => Some((parse_cell(start)?, parse_cell(end)?)),
        None => {
            let only = parse_cell(cells)?;
            Some((only, only))
        }
    }
}
