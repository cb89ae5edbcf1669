//! JSON export of the derived chart datasets

use crate::view::ReportView;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct JsonExport<'a> {
    generated: String,
    #[serde(flatten)]
    view: &'a ReportView,
}

pub fn write<W: Write>(writer: &mut W, view: &ReportView) -> io::Result<()> {
    let export = JsonExport {
        generated: chrono::Local::now().to_rfc3339(),
        view,
    };
    serde_json::to_writer_pretty(&mut *writer, &export)?;
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationReport, TagStatistics};

    #[test]
    fn test_json_no_data_is_null() {
        let mut report = EvaluationReport::default();
        report.tag_statistics.insert("ghost".to_string(), TagStatistics::default());
        let view = ReportView::from_report(&report);

        let mut buf = Vec::new();
        write(&mut buf, &view).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert!(json["generated"].is_string());
        assert!(json["overall_accuracy"].is_null());
        assert_eq!(json["overall_accuracy_label"], "no data");
        assert_eq!(json["unranked"][0]["tag"], "ghost");
        assert!(json["unranked"][0]["accuracy"].is_null());
        assert_eq!(json["summary"]["distinct_tags"], 1);
    }
}
