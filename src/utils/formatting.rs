use core::fmt;

/// Column-aligned text layout for IR listings.
#[derive(Default)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_cols = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0; n_cols];
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i + 1 == row.len() {
                    // no trailing padding
                    write!(f, "{}", cell)?;
                } else {
                    write!(f, "{:width$} ", cell, width = widths[i])?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
