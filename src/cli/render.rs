use vera::Row;

/// Plain-text column table: header, separator, one line per row, count.
#[derive(Debug, Default)]
pub struct TableRenderer {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableRenderer {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<I, S>(headers: I, rows: &[Row]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(headers);
        for row in rows {
            table.row(row.iter().map(ToString::to_string).collect());
        }
        table
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn render(&self) -> String {
        if self.headers.is_empty() {
            return "Empty result set\n".to_string();
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| {
            widths
                .iter()
                .enumerate()
                .map(|(i, width)| {
                    let cell = cells.get(i).map(String::as_str).unwrap_or("");
                    format!("{:width$}", cell, width = *width)
                })
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        out.push_str(&line(&self.headers));
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(row));
            out.push('\n');
        }
        out.push_str(&format!("\n{} row(s)\n", self.rows.len()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pads_columns() {
        let mut table = TableRenderer::new(["Name", "Code"]);
        table.row(vec!["Finance".into(), "FIN".into()]);
        table.row(vec!["HR".into(), "HR".into()]);

        let out = table.render();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "Name    | Code");
        assert_eq!(lines[1], "--------+-----");
        assert_eq!(lines[2], "Finance | FIN");
        assert_eq!(lines[3], "HR      | HR");
        assert!(out.ends_with("2 row(s)\n"));
    }

    #[test]
    fn test_empty_headers() {
        assert_eq!(TableRenderer::default().render(), "Empty result set\n");
    }
}
