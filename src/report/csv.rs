//! CSV export: one row per tag, ranked tags first

use crate::view::ReportView;
use std::io::{self, Write};

const HEADER: &str = "rank,tag,accuracy,recall,total,correct,wrong,missed";

pub fn write<W: Write>(writer: &mut W, view: &ReportView) -> io::Result<()> {
    writeln!(writer, "{}", HEADER)?;

    for (i, bar) in view.ranking.iter().enumerate() {
        write_row(writer, &(i + 1).to_string(), bar)?;
    }
    for bar in &view.unranked {
        write_row(writer, "", bar)?;
    }

    Ok(())
}

fn write_row<W: Write>(writer: &mut W, rank: &str, bar: &crate::view::BarDatum) -> io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{}",
        rank,
        csv_escape(&bar.tag),
        percent_cell(bar.accuracy.percent()),
        percent_cell(bar.recall.percent()),
        bar.total,
        bar.correct,
        bar.wrong,
        bar.missed
    )
}

/// Undefined ratios are left empty
fn percent_cell(p: Option<f64>) -> String {
    p.map(|v| format!("{:.1}", v)).unwrap_or_default()
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
