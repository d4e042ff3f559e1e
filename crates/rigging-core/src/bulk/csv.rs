//! Minimal CSV reader for bulk input files.
//!
//! Supports a header row, comma separators, blank lines, `#` comment lines and
//! double-quoted cells (with `""` as an escaped quote). Unquoted cells are
//! trimmed; quoted cells keep their content verbatim. A quote may only open a
//! cell, and only separators or whitespace may follow its closing quote.

use crate::error::OrchestrationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// 1-based line number in the source file
    pub line: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl CsvTable {
    pub fn parse(content: &str) -> Result<Self, OrchestrationError> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| OrchestrationError::configuration("CSV file is empty"))?;
        let headers = split_line(header).map_err(|reason| {
            OrchestrationError::configuration(format!("CSV header (line {header_line}): {reason}"))
        })?;

        let mut rows = Vec::new();
        for (line, text) in lines {
            // Quote errors are left to row validation; keep the raw text as one cell
            let cells = split_line(text).unwrap_or_else(|_| vec![text.to_string()]);
            rows.push(CsvRow { line, cells });
        }
        Ok(Self { headers, rows })
    }
}

fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut cells = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut cell = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') if chars.next_if_eq(&'"').is_some() => cell.push('"'),
                    Some('"') => break,
                    Some(c) => cell.push(c),
                    None => return Err("unterminated quote".to_string()),
                }
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if let Some(c) = chars.peek().filter(|c| **c != ',') {
                return Err(format!("unexpected '{c}' after closing quote"));
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                if c == '"' {
                    return Err("quote inside an unquoted cell".to_string());
                }
                cell.push(c);
            }
            cell.truncate(cell.trim_end().len());
        }
        cells.push(cell);

        // Either the separator or the end of the line
        if chars.next().is_none() {
            break;
        }
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comment_lines() {
        let table = CsvTable::parse("address,admin\n\n# reviewers\n0xabc, yes \n").unwrap();
        assert_eq!(table.headers, ["address", "admin"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].line, 4);
        assert_eq!(table.rows[0].cells, ["0xabc", "yes"]);
    }

    #[test]
    fn handles_quoted_cells() {
        let table = CsvTable::parse("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(table.rows[0].cells, ["x, y", "say \"hi\""]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(CsvTable::parse("\n\n").is_err());
    }

    #[test]
    fn trailing_empty_cell_is_kept() {
        let table = CsvTable::parse("a,b\n1,\n").unwrap();
        assert_eq!(table.rows[0].cells, ["1", ""]);
    }

    #[test]
    fn quoted_cells_keep_their_whitespace() {
        let table = CsvTable::parse("a,b\n  \" padded \" , plain  \n").unwrap();
        assert_eq!(table.rows[0].cells, [" padded ", "plain"]);
    }

    #[test]
    fn stray_quote_in_header_is_an_error() {
        assert!(CsvTable::parse("addr\"ess,admin\n").is_err());
        assert!(CsvTable::parse("\"address\"x,admin\n").is_err());
    }

    #[test]
    fn malformed_row_is_kept_as_a_single_raw_cell() {
        let table = CsvTable::parse("a,b\n0x\"12,yes\n\"open,no\n").unwrap();
        assert_eq!(table.rows[0].cells, ["0x\"12,yes"]);
        assert_eq!(table.rows[1].cells, ["\"open,no"]);
    }
}
