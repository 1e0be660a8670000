//! Operator-facing rendering of SCM namespaces

use crate::domain::ports::ScmNamespace;

const HEADERS: [&str; 3] = ["SCM Namespace", "Socket", "Capacity"];

/// Render namespaces as an aligned text table
pub fn render_namespaces(namespaces: &[ScmNamespace]) -> String {
    let rows: Vec<[String; 3]> = namespaces
        .iter()
        .map(|ns| {
            [
                ns.block_device.clone(),
                ns.socket_id.to_string(),
                format_bytes(ns.size_bytes),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS, &widths);
    let rules = widths.map(|w| "-".repeat(w));
    push_row(&mut out, &rules, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;
    const PB: u64 = TB * 1024;

    if bytes >= PB {
        format!("{:.2}PB", bytes as f64 / PB as f64)
    } else if bytes >= TB {
        format!("{:.2}TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
