//! Report rendering

use crate::TestCase;
use std::fmt;

pub const REPORT_HEADER: &str = "--- QA AUTOMATION REPORT ---";
pub const REPORT_FOOTER: &str = "----------------------------";

/// A rendered report. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report(String);

impl Report {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lines between header and footer
    pub fn case_lines(&self) -> impl Iterator<Item = &str> {
        self.0
            .lines()
            .filter(|line| *line != REPORT_HEADER && *line != REPORT_FOOTER)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Report {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Header, one `TC_{id:03}: {CATEGORY}: {description}` line per case in
/// input order, footer. No trailing newline.
pub fn format_report(cases: &[TestCase]) -> Report {
    let mut out = String::with_capacity(REPORT_HEADER.len() + REPORT_FOOTER.len() + cases.len() * 96);
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for case in cases {
        out.push_str(&format!("TC_{:03}: {}: {}\n", case.id, case.category, case.description));
    }
    out.push_str(REPORT_FOOTER);
    Report(out)
}
