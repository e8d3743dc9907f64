//! Time-derived naming of working directories and object keys.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::ARCHIVE_SUFFIX;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H%M%S";

/// Date and time-of-day keys identifying one run's outputs.
///
/// Both components sort lexicographically in chronological order. Naming is
/// unique only at second granularity: two runs reaching this step within the
/// same second would collide, which the run guard currently rules out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    date: String,
    time: String,
}

impl Partition {
    /// Partition for a run started at `started_at`.
    pub fn from_timestamp(started_at: DateTime<Utc>) -> Self {
        Self {
            date: started_at.format(DATE_FORMAT).to_string(),
            time: started_at.format(TIME_FORMAT).to_string(),
        }
    }

    /// Calendar date component, `YYYY-MM-DD`.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Time-of-day component, `HHMMSS`.
    pub fn time(&self) -> &str {
        &self.time
    }

    /// `<root>/<date>/<time>`
    pub fn working_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.date).join(&self.time)
    }

    /// `<date>/<time>.tar.gz`
    pub fn object_key(&self) -> String {
        format!("{}/{}{}", self.date, self.time, ARCHIVE_SUFFIX)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date, self.time)
    }
}
