//! Table reconstruction: cell-index matrix → spanning HTML table.
//!
//! The remote parser describes a table as a flat cell list plus a grid whose
//! entries are cell indices. A merged cell shows up as the same index filling
//! a rectangle of grid positions. GFM pipe tables cannot express merges, so
//! tables are emitted as HTML with `rowspan`/`colspan`.
//!
//! A merge that does not fill an axis-aligned rectangle (a "staircase") has no
//! faithful HTML rendering. Rather than guess, such tables are rendered
//! ungrouped: one cell per grid position, the text on the index's first
//! position only.

use crate::document::Table;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const TABLE_OPEN: &str = r#"<table style="text-align:center">"#;
const CELL_STYLE: &str = r#"style="text-align:center""#;

/// Render `table` as HTML, falling back to its markdown when the cell list or
/// matrix is empty.
pub fn table_to_html(table: &Table) -> String {
    if table.cells.is_empty() || table.matrix.iter().all(|row| row.is_empty()) {
        debug!("Table has no cells or empty matrix; using markdown fallback");
        return table.markdown.clone();
    }

    if !merges_are_rectangular(&table.matrix) {
        debug!("Non-rectangular merge detected; rendering table ungrouped");
        return render_ungrouped(table);
    }

    let matrix = &table.matrix;
    let mut covered: HashSet<(usize, usize)> = HashSet::new();
    let mut html = vec![TABLE_OPEN.to_string()];

    for (r, row) in matrix.iter().enumerate() {
        html.push("<tr>".to_string());
        let mut c = 0;
        while c < row.len() {
            if covered.contains(&(r, c)) {
                c += 1;
                continue;
            }
            let colspan = colspan_at(matrix, r, c);
            let rowspan = rowspan_at(matrix, r, c);
            for (rr, span_row) in matrix.iter().enumerate().skip(r + 1).take(rowspan - 1) {
                for cc in c..(c + colspan).min(span_row.len()) {
                    covered.insert((rr, cc));
                }
            }
            html.push(render_cell(&cell_text(table, row[c]), rowspan, colspan));
            c += colspan;
        }
        html.push("</tr>".to_string());
    }

    html.push("</table>".to_string());
    html.join("\n")
}

/// Length of the run of `matrix[r][c]` to the right, within row `r`.
fn colspan_at(matrix: &[Vec<usize>], r: usize, c: usize) -> usize {
    let row = &matrix[r];
    let idx = row[c];
    1 + row[c + 1..].iter().take_while(|&&v| v == idx).count()
}

/// Length of the run of `matrix[r][c]` downward, within column `c`.
///
/// A shorter row below ends the run.
fn rowspan_at(matrix: &[Vec<usize>], r: usize, c: usize) -> usize {
    let idx = matrix[r][c];
    1 + matrix[r + 1..]
        .iter()
        .take_while(|row| row.get(c) == Some(&idx))
        .count()
}

/// `true` when every index's positions fill its bounding rectangle exactly.
fn merges_are_rectangular(matrix: &[Vec<usize>]) -> bool {
    // index -> (min_r, max_r, min_c, max_c, count)
    let mut extents: HashMap<usize, (usize, usize, usize, usize, usize)> = HashMap::new();
    for (r, row) in matrix.iter().enumerate() {
        for (c, &idx) in row.iter().enumerate() {
            extents
                .entry(idx)
                .and_modify(|e| {
                    e.0 = e.0.min(r);
                    e.1 = e.1.max(r);
                    e.2 = e.2.min(c);
                    e.3 = e.3.max(c);
                    e.4 += 1;
                })
                .or_insert((r, r, c, c, 1));
        }
    }
    extents
        .values()
        .all(|&(r0, r1, c0, c1, count)| (r1 - r0 + 1) * (c1 - c0 + 1) == count)
}

fn render_ungrouped(table: &Table) -> String {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut html = vec![TABLE_OPEN.to_string()];
    for row in &table.matrix {
        html.push("<tr>".to_string());
        for &idx in row {
            let text = if seen.insert(idx) {
                cell_text(table, idx)
            } else {
                String::new()
            };
            html.push(render_cell(&text, 1, 1));
        }
        html.push("</tr>".to_string());
    }
    html.push("</table>".to_string());
    html.join("\n")
}

/// Escaped text of cell `idx`; an index past the cell list reads as empty.
fn cell_text(table: &Table, idx: usize) -> String {
    match table.cells.get(idx) {
        Some(cell) => escape_cell_text(cell.text.trim()),
        None => {
            debug!("Matrix references missing cell {idx}");
            String::new()
        }
    }
}

fn render_cell(text: &str, rowspan: usize, colspan: usize) -> String {
    let mut attrs = vec![CELL_STYLE.to_string()];
    if rowspan > 1 {
        attrs.push(format!(r#"rowspan="{rowspan}""#));
    }
    if colspan > 1 {
        attrs.push(format!(r#"colspan="{colspan}""#));
    }
    format!("<td {}>{}</td>", attrs.join(" "), text)
}

/// Escape HTML special characters and turn line breaks into `<br>`.
pub fn escape_cell_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Cell;

    fn table(cells: &[&str], matrix: Vec<Vec<usize>>) -> Table {
        Table {
            cells: cells.iter().map(|t| Cell::new(*t)).collect(),
            matrix,
            markdown: "| fallback |".into(),
        }
    }

    fn tds(html: &str) -> Vec<&str> {
        html.lines().filter(|l| l.starts_with("<td")).collect()
    }

    fn rows(html: &str) -> Vec<Vec<&str>> {
        let mut out = Vec::new();
        for line in html.lines() {
            match line {
                "<tr>" => out.push(Vec::new()),
                l if l.starts_with("<td") => out.last_mut().unwrap().push(l),
                _ => {}
            }
        }
        out
    }

    #[test]
    fn merge_free_table_has_rows_times_cols_cells() {
        let t = table(
            &["a", "b", "c", "d", "e", "f"],
            vec![vec![0, 1, 2], vec![3, 4, 5]],
        );
        let html = table_to_html(&t);
        let cells = tds(&html);
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|c| !c.contains("span")));
        assert!(html.starts_with(TABLE_OPEN));
        assert!(html.ends_with("</table>"));
    }

    #[test]
    fn two_by_two_merge_emits_single_spanning_cell() {
        // 3×3 grid, index 0 covers the top-left 2×2 block.
        let t = table(
            &["M", "b", "c", "d", "e", "f"],
            vec![vec![0, 0, 1], vec![0, 0, 2], vec![3, 4, 5]],
        );
        let html = table_to_html(&t);
        let r = rows(&html);
        assert_eq!(r.len(), 3);
        assert_eq!(
            r[0],
            vec![
                r#"<td style="text-align:center" rowspan="2" colspan="2">M</td>"#,
                r#"<td style="text-align:center">b</td>"#,
            ]
        );
        assert_eq!(r[1], vec![r#"<td style="text-align:center">c</td>"#]);
        assert_eq!(r[2].len(), 3);
        assert_eq!(tds(&html).iter().filter(|c| c.contains(">M<")).count(), 1);
    }

    #[test]
    fn header_colspan_scenario() {
        let t = table(&["A", "B", "C"], vec![vec![0, 0], vec![1, 2]]);
        let html = table_to_html(&t);
        let r = rows(&html);
        assert_eq!(
            r[0],
            vec![r#"<td style="text-align:center" colspan="2">A</td>"#]
        );
        assert_eq!(
            r[1],
            vec![
                r#"<td style="text-align:center">B</td>"#,
                r#"<td style="text-align:center">C</td>"#,
            ]
        );
    }

    #[test]
    fn vertical_merge_skips_covered_positions() {
        let t = table(&["X", "b", "c"], vec![vec![0, 1], vec![0, 2]]);
        let html = table_to_html(&t);
        let r = rows(&html);
        assert_eq!(
            r[0][0],
            r#"<td style="text-align:center" rowspan="2">X</td>"#
        );
        assert_eq!(r[1], vec![r#"<td style="text-align:center">c</td>"#]);
    }

    #[test]
    fn ragged_rows_do_not_panic() {
        let t = table(
            &["a", "b", "c", "d", "e", "f"],
            vec![vec![0, 1, 2], vec![3], vec![4, 5]],
        );
        let html = table_to_html(&t);
        let r = rows(&html);
        assert_eq!(r.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn ragged_row_ends_vertical_run() {
        // Column 1 of row 1 does not exist; index 1 must not extend into it.
        let t = table(&["a", "b", "c"], vec![vec![0, 1], vec![2]]);
        let html = table_to_html(&t);
        assert!(!html.contains("rowspan"));
        assert_eq!(tds(&html).len(), 3);
    }

    #[test]
    fn empty_inputs_fall_back_to_markdown() {
        assert_eq!(table_to_html(&table(&[], vec![vec![0]])), "| fallback |");
        assert_eq!(table_to_html(&table(&["a"], vec![])), "| fallback |");
        assert_eq!(
            table_to_html(&table(&["a"], vec![vec![], vec![]])),
            "| fallback |"
        );
    }

    #[test]
    fn staircase_merge_renders_ungrouped() {
        // Index 0 covers an L-shape.
        let t = table(&["L", "b"], vec![vec![0, 0], vec![0, 1]]);
        let html = table_to_html(&t);
        assert!(!html.contains("span"));
        let cells = tds(&html);
        assert_eq!(cells.len(), 4);
        assert_eq!(cells.iter().filter(|c| c.contains(">L<")).count(), 1);
    }

    #[test]
    fn out_of_range_index_renders_empty_cell() {
        let t = table(&["a"], vec![vec![0, 9]]);
        let cells = tds(&table_to_html(&t)).into_iter().map(String::from).collect::<Vec<_>>();
        assert_eq!(cells[1], r#"<td style="text-align:center"></td>"#);
    }

    #[test]
    fn cell_text_is_escaped() {
        let t = table(&[" a<b> & \"c\"\nd "], vec![vec![0]]);
        let html = table_to_html(&t);
        assert!(html.contains("a&lt;b&gt; &amp; &quot;c&quot;<br>d"), "{html}");
    }
}
