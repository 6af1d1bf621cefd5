use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
};

use chrono::{Local, NaiveDate};

const DATE_FORMAT: &str = "%Y%m%d";
const DEFAULT_FILE_SIZE_LIMIT: u64 = 1024 * 1024 * 1024;
const DEFAULT_RETAINED_FILE_COUNT: usize = 31;

/// Source of the current calendar date for rotation decisions.
pub trait Clock: Send + 'static {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Where files go, how they are named and when they roll.
///
/// Files are named `{prefix}{yyyyMMdd}{suffix}`, with `_001`, `_002`, ...
/// inserted before the suffix for size rollovers on the same day.
#[derive(Debug, Clone)]
pub struct RollingPolicy {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub file_suffix: String,
    pub file_size_limit: Option<u64>,
    pub roll_on_file_size_limit: bool,
    pub retained_file_count: Option<usize>,
}

impl RollingPolicy {
    pub fn new(directory: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
            file_suffix: ".txt".to_string(),
            file_size_limit: Some(DEFAULT_FILE_SIZE_LIMIT),
            roll_on_file_size_limit: true,
            retained_file_count: Some(DEFAULT_RETAINED_FILE_COUNT),
        }
    }

    pub fn file_size_limit(mut self, limit: Option<u64>) -> Self {
        self.file_size_limit = limit;
        self
    }

    pub fn roll_on_file_size_limit(mut self, roll: bool) -> Self {
        self.roll_on_file_size_limit = roll;
        self
    }

    pub fn retained_file_count(mut self, count: Option<usize>) -> Self {
        self.retained_file_count = count;
        self
    }

    pub fn file_name(&self, date: NaiveDate, sequence: u32) -> String {
        if sequence == 0 {
            format!("{}{}{}", self.file_prefix, date.format(DATE_FORMAT), self.file_suffix)
        } else {
            format!(
                "{}{}_{:03}{}",
                self.file_prefix,
                date.format(DATE_FORMAT),
                sequence,
                self.file_suffix
            )
        }
    }

    fn parse_file_name(&self, name: &str) -> Option<(NaiveDate, u32)> {
        let stem = name
            .strip_prefix(&self.file_prefix)?
            .strip_suffix(&self.file_suffix)?;

        let (date, sequence) = match stem.split_once('_') {
            Some((date, sequence)) => (date, sequence.parse().ok()?),
            None => (stem, 0),
        };
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .ok()
            .map(|date| (date, sequence))
    }

    fn limit_reached(&self, size: u64, incoming: usize) -> bool {
        match self.file_size_limit {
            Some(limit) => size > 0 && size + incoming as u64 > limit,
            None => false,
        }
    }
}

struct ActiveFile {
    date: NaiveDate,
    sequence: u32,
    path: PathBuf,
    file: File,
    size: u64,
}

/// File writer that rotates daily and on size overflow, and deletes the
/// oldest files beyond the retained count whenever a new file is opened.
///
/// Files are opened lazily on the first write, so construction never fails.
pub struct RollingFileSink<C = LocalClock> {
    policy: RollingPolicy,
    clock: C,
    current: Option<ActiveFile>,
}

impl RollingFileSink<LocalClock> {
    pub fn new(policy: RollingPolicy) -> Self {
        Self::with_clock(policy, LocalClock)
    }
}

impl<C: Clock> RollingFileSink<C> {
    pub fn with_clock(policy: RollingPolicy, clock: C) -> Self {
        Self {
            policy,
            clock,
            current: None,
        }
    }

    /// Path of the file currently written to, if any.
    pub fn current_path(&self) -> Option<&PathBuf> {
        self.current.as_ref().map(|active| &active.path)
    }

    fn roll(&mut self, today: NaiveDate, incoming: usize) -> io::Result<()> {
        fs::create_dir_all(&self.policy.directory)?;

        let mut sequence = match &self.current {
            Some(active) if active.date == today => active.sequence + 1,
            _ => self.latest_sequence(today),
        };

        loop {
            let path = self.policy.directory.join(self.policy.file_name(today, sequence));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let size = file.metadata()?.len();

            if self.policy.roll_on_file_size_limit && self.policy.limit_reached(size, incoming) {
                sequence += 1;
                continue;
            }

            if let Some(mut previous) = self.current.take() {
                let _ = previous.file.flush();
            }
            self.current = Some(ActiveFile {
                date: today,
                sequence,
                path,
                file,
                size,
            });
            break;
        }

        self.prune();
        Ok(())
    }

    fn latest_sequence(&self, date: NaiveDate) -> u32 {
        self.existing_files()
            .into_iter()
            .filter(|(file_date, _, _)| *file_date == date)
            .map(|(_, sequence, _)| sequence)
            .max()
            .unwrap_or(0)
    }

    fn existing_files(&self) -> Vec<(NaiveDate, u32, PathBuf)> {
        let Ok(entries) = fs::read_dir(&self.policy.directory) else {
            return Vec::new();
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let (date, sequence) = self.policy.parse_file_name(name.to_str()?)?;
                Some((date, sequence, entry.path()))
            })
            .collect()
    }

    fn prune(&self) {
        let Some(retained) = self.policy.retained_file_count else {
            return;
        };

        let mut files = self.existing_files();
        files.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

        let current = self.current_path();
        for (_, _, path) in files.into_iter().skip(retained) {
            if Some(&path) == current {
                continue;
            }
            // Reported on stderr: this sink sits under the subscriber.
            if let Err(err) = fs::remove_file(&path) {
                eprintln!("failed to remove expired log file {}: {}", path.display(), err);
            }
        }
    }
}

impl<C: Clock> Write for RollingFileSink<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let today = self.clock.today();

        let needs_roll = match &self.current {
            None => true,
            Some(active) => {
                active.date != today
                    || (self.policy.roll_on_file_size_limit
                        && self.policy.limit_reached(active.size, buf.len()))
            }
        };
        if needs_roll {
            self.roll(today, buf.len())?;
        }

        let Some(active) = self.current.as_mut() else {
            return Ok(buf.len());
        };
        if self.policy.limit_reached(active.size, buf.len()) {
            // Size limit reached without rollover: drop the event.
            return Ok(buf.len());
        }

        active.file.write_all(buf)?;
        active.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some(active) => active.file.flush(),
            None => Ok(()),
        }
    }
}
