//! Output rendering: one comma-joined line per document, totals on stderr

use std::io::{self, Write};

use scrollpipe_core::Row;

/// Write `rows` as `v1,v2,...` lines
pub fn write_rows<W: Write>(out: &mut W, rows: &[Row]) -> io::Result<()> {
    for row in rows {
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()
}

pub fn total_line(count: u64) -> String {
    format!("Scrolled through a total of {count} documents")
}
