use std::{fmt::Write as _, fs, path::Path};

use chrono::NaiveDateTime;

use crate::{core::controller::CycleResult, prelude::*};

/// Final trace of a cycle as written to the output directory.
pub struct Report<'a> {
    result: &'a CycleResult,
    finished_at: NaiveDateTime,
}

impl<'a> Report<'a> {
    pub const fn new(result: &'a CycleResult, finished_at: NaiveDateTime) -> Self {
        Self { result, finished_at }
    }

    /// `latest.txt` always holds the last successful run, `error.txt` the last failed one.
    pub fn summary_file_name(&self) -> &'static str {
        if self.result.is_success() { "latest.txt" } else { "error.txt" }
    }

    pub fn timestamped_file_name(&self) -> String {
        format!("{}.txt", self.finished_at.format("%Y-%m-%d-%H:%M:%S"))
    }

    pub fn render(&self) -> String {
        self.result.trace.lines().iter().fold(String::new(), |mut text, line| {
            let _ = writeln!(text, "{line}");
            text
        })
    }

    /// The report is a courtesy, so failing to write it only gets logged.
    #[instrument(skip_all, fields(directory = %directory.display()))]
    pub fn write_to(&self, directory: &Path) {
        if let Err(error) = self.write_fallibly_to(directory) {
            error!("failed to write the report: {error:#}");
        }
    }

    fn write_fallibly_to(&self, directory: &Path) -> Result {
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create `{}`", directory.display()))?;
        let text = self.render();
        for file_name in [self.timestamped_file_name().as_str(), self.summary_file_name()] {
            let path = directory.join(file_name);
            fs::write(&path, &text)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
        }
        info!(file_name = self.summary_file_name(), "written");
        Ok(())
    }
}
