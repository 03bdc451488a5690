// src/report.rs

//! Output formatting: one row per file, or one age histogram row per revision.

use crate::model::{bucket_date, day_bucket, AgeBucket, FileSummary};
use std::borrow::Cow;
use std::io::{self, BufWriter, Write};

/// Columns of the per-file report
pub const HEADER: [&str; 4] = ["DATE(MODE)", "DATE(MEAN)", "AUTHOR(MODE)", "PATH"];

/// Files at least this many years old share the last histogram column
pub const MAX_YEARS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    #[default]
    Tsv,
    Csv,
}

impl Dialect {
    fn delimiter(self) -> char {
        match self {
            Dialect::Tsv => '\t',
            Dialect::Csv => ',',
        }
    }
}

/// Receives finished summaries in walk order.
pub trait SummarySink {
    fn summary(&mut self, summary: FileSummary) -> io::Result<()>;

    /// Called after each batch; everything delivered so far is final.
    fn batch_done(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SummarySink for Vec<FileSummary> {
    fn summary(&mut self, summary: FileSummary) -> io::Result<()> {
        self.push(summary);
        Ok(())
    }
}

/// Quote a field if it contains the delimiter, quotes or line breaks.
fn escape_field(field: &str, delimiter: char) -> Cow<'_, str> {
    if field.contains(delimiter) || field.contains(['"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// `YYYY-MM-DD`, or the raw day number when no calendar date exists for it
pub fn format_day(day: AgeBucket) -> String {
    match bucket_date(day) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => day.to_string(),
    }
}

fn write_row<W: Write, S: AsRef<str>>(out: &mut W, dialect: Dialect, fields: &[S]) -> io::Result<()> {
    let delimiter = dialect.delimiter();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            write!(out, "{}", delimiter)?;
        }
        write!(out, "{}", escape_field(field.as_ref(), delimiter))?;
    }
    writeln!(out)
}

/// Writes the per-file report
pub struct RecordWriter<W: Write> {
    out: BufWriter<W>,
    dialect: Dialect,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, dialect: Dialect) -> Self {
        Self {
            out: BufWriter::new(out),
            dialect,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        write_row(&mut self.out, self.dialect, &HEADER)
    }

    pub fn write_summary(&mut self, summary: &FileSummary) -> io::Result<()> {
        let fields = [
            format_day(summary.age_mode),
            format_day(summary.age_mean_floor),
            summary.author_mode.clone(),
            summary.path.clone(),
        ];
        write_row(&mut self.out, self.dialect, &fields)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.out.into_inner().map_err(|err| err.into_error())
    }
}

impl<W: Write> SummarySink for RecordWriter<W> {
    fn summary(&mut self, summary: FileSummary) -> io::Result<()> {
        self.write_summary(&summary)
    }

    fn batch_done(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Files of one revision counted by how many years old their modal line is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearsOldHistogram {
    revision_day: AgeBucket,
    counts: [u64; MAX_YEARS],
}

impl YearsOldHistogram {
    pub fn new(revision_time: i64) -> Self {
        Self {
            revision_day: day_bucket(revision_time),
            counts: [0; MAX_YEARS],
        }
    }

    pub fn years_old(&self, age_mode: AgeBucket) -> usize {
        let years = ((self.revision_day - age_mode) as f64 / 365.0).round();
        years.clamp(0.0, (MAX_YEARS - 1) as f64) as usize
    }

    pub fn add(&mut self, summary: &FileSummary) {
        let years = self.years_old(summary.age_mode);
        self.counts[years] += 1;
    }

    pub fn counts(&self) -> &[u64; MAX_YEARS] {
        &self.counts
    }
}

impl SummarySink for YearsOldHistogram {
    fn summary(&mut self, summary: FileSummary) -> io::Result<()> {
        self.add(&summary);
        Ok(())
    }
}

/// Writes one histogram row per revision
pub struct YearsOldWriter<W: Write> {
    out: BufWriter<W>,
    dialect: Dialect,
}

impl<W: Write> YearsOldWriter<W> {
    pub fn new(out: W, dialect: Dialect) -> Self {
        Self {
            out: BufWriter::new(out),
            dialect,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let mut fields = vec!["tag".to_string(), "date".to_string()];
        fields.extend((0..MAX_YEARS).map(|years| format!("{} years old", years)));
        write_row(&mut self.out, self.dialect, &fields)
    }

    pub fn write_histogram(&mut self, revision: &str, revision_time: i64, histogram: &YearsOldHistogram) -> io::Result<()> {
        let mut fields = vec![revision.to_string(), format_day(day_bucket(revision_time))];
        fields.extend(histogram.counts().iter().map(|&count| {
            if count == 0 {
                String::new()
            } else {
                format!("{} files", count)
            }
        }));
        write_row(&mut self.out, self.dialect, &fields)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.out.into_inner().map_err(|err| err.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(path: &str, mode: AgeBucket, mean: AgeBucket, author: &str) -> FileSummary {
        FileSummary {
            path: path.to_string(),
            age_mode: mode,
            age_mean: mean as f64,
            age_mean_floor: mean,
            author_mode: author.to_string(),
        }
    }

    fn render(dialect: Dialect, summaries: &[FileSummary]) -> String {
        let mut writer = RecordWriter::new(Vec::new(), dialect);
        writer.write_header().unwrap();
        for s in summaries {
            writer.write_summary(s).unwrap();
        }
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_tsv_rows() {
        let out = render(Dialect::Tsv, &[summary("src/chicken-parma.c", 0, 0, "twb")]);
        assert_eq!(
            out,
            "DATE(MODE)\tDATE(MEAN)\tAUTHOR(MODE)\tPATH\n1970-01-01\t1970-01-01\ttwb\tsrc/chicken-parma.c\n"
        );
    }

    #[test]
    fn test_csv_quoting() {
        let out = render(Dialect::Csv, &[summary("a,b.txt", 5843, 3024, "Buck, \"twb\"")]);
        let row = out.lines().nth(1).unwrap();
        assert_eq!(row, "1985-12-31,1978-04-13,\"Buck, \"\"twb\"\"\",\"a,b.txt\"");
    }

    #[test]
    fn test_tab_in_path_is_quoted_for_tsv_only() {
        let tsv = render(Dialect::Tsv, &[summary("odd\tname", 0, 0, "x")]);
        assert!(tsv.ends_with("\"odd\tname\"\n"));
        let csv = render(Dialect::Csv, &[summary("odd\tname", 0, 0, "x")]);
        assert!(csv.ends_with(",odd\tname\n"));
    }

    #[test]
    fn test_format_day_out_of_range() {
        assert_eq!(format_day(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_years_old_buckets() {
        let revision_time = 3650 * 86_400;
        let mut histogram = YearsOldHistogram::new(revision_time);
        assert_eq!(histogram.years_old(3650), 0);
        assert_eq!(histogram.years_old(3650 - 365), 1);
        assert_eq!(histogram.years_old(3650 - 500), 1);
        assert_eq!(histogram.years_old(3650 - 600), 2);
        // newer than the revision itself
        assert_eq!(histogram.years_old(4000), 0);
        // anything past the last column lands in it
        assert_eq!(histogram.years_old(-100 * 365), MAX_YEARS - 1);

        histogram.add(&summary("a", 3650, 3650, "x"));
        histogram.add(&summary("b", 3650 - 365, 3650, "x"));
        histogram.add(&summary("c", 3650 - 380, 3650, "x"));

        let mut writer = YearsOldWriter::new(Vec::new(), Dialect::Csv);
        writer.write_header().unwrap();
        writer.write_histogram("v1.0", revision_time, &histogram).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = out.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("tag,date,0 years old,1 years old,"));
        assert!(header.ends_with(",49 years old"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("v1.0,1979-12-30,1 files,2 files,,"));
        assert_eq!(row.split(',').count(), 2 + MAX_YEARS);
    }
}
