use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use log::warn;

/// The symbols an instrumented program references. A real toolchain links
/// these from a small run-time object; here the interpreter dispatches on
/// the hook when it executes the dump call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeHook {
    /// `print_data(name, counters, indexes, size)`, the per-function dump
    /// the KS/Ball exit hooks call at every return.
    PrintData,
    /// `nisse_print_data(counters, indexes, size)`, the module-wide dump
    /// called from main's returns.
    NissePrintData,
}

/// Where profile records land. A run truncates each profile file the first
/// time it touches it and appends from then on, so one run's records never
/// mix with a previous run's.
pub struct ProfileSink {
    dir: PathBuf,
    files: HashMap<String, File>,
}

impl ProfileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: HashMap::new(),
        }
    }

    /// Append `(index, count)` records for one function invocation to
    /// `<function>.prof`.
    pub fn print_data(&mut self, function: &str, counters: &[i32], indexes: &[i32]) {
        let file = format!("{}.prof", function);
        self.append(
            &file,
            indexes
                .iter()
                .zip(counters.iter())
                .map(|(&index, &count)| (index as i64, count as i64)),
        );
    }

    /// Append the module-wide records to `main.prof`.
    pub fn nisse_print_data(&mut self, counters: &[i64], indexes: &[i32]) {
        self.append(
            "main.prof",
            indexes
                .iter()
                .zip(counters.iter())
                .map(|(&index, &count)| (index as i64, count)),
        );
    }

    fn append(&mut self, file_name: &str, records: impl Iterator<Item = (i64, i64)>) {
        let file = match self.files.entry(file_name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = self.dir.join(file_name);
                match OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)
                {
                    Ok(file) => entry.insert(file),
                    Err(error) => {
                        // The program being profiled must not die over a
                        // dropped profile; complain and carry on.
                        warn!("cannot open {}: {}", path.display(), error);
                        return;
                    }
                }
            }
        };

        for (index, count) in records {
            if let Err(error) = writeln!(file, "{} {}", index, count) {
                warn!("cannot append to {}: {}", file_name, error);
                return;
            }
        }
    }
}
