use client_core::{
    export::format_value,
    record::{Column, Fields, Pipelined},
};

/// Left-aligned columns separated by two spaces, header first.
pub fn table<T: Fields>(rows: &[T], columns: &[Column]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|column| cell(row, column.key)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain([column.label.chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, columns.iter().map(|c| c.label.to_string()), &widths);
    for row in cells {
        push_line(&mut out, row, &widths);
    }
    out
}

/// One section per status. Rows must already be in board order.
pub fn board<T: Pipelined + Fields>(rows: &[T], title_key: &str) -> String {
    let mut out = String::new();
    let mut current = None;
    for row in rows {
        let status = row.status();
        if current != Some(status) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("== {status} ==\n"));
            current = Some(status);
        }
        let id = format!("#{}", row.id());
        out.push_str(&format!(
            "  {:>2}  {id:<6} {}\n",
            row.position(),
            cell(row, title_key)
        ));
    }
    out
}

fn cell<T: Fields>(row: &T, key: &str) -> String {
    row.field(key)
        .map(format_value)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "-".to_string())
}

fn push_line(out: &mut String, cells: impl IntoIterator<Item = String>, widths: &[usize]) {
    let line = cells
        .into_iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
