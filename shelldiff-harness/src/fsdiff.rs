//! Comparison of the two shells' filesystem side effects.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use crate::Error;

/// A single difference between the candidate and reference snapshot directories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirComparisonEntry {
    /// File exists only in the candidate snapshot.
    CandidateOnly(PathBuf),
    /// File exists only in the reference snapshot.
    ReferenceOnly(PathBuf),
    /// Files exist in both snapshots but their contents differ.
    Different {
        /// Path of the candidate's file.
        candidate: PathBuf,
        /// Path of the reference's file.
        reference: PathBuf,
    },
}

/// Result of comparing two snapshot directories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirComparison {
    /// Directory contents match.
    Same,
    /// Directory contents differ.
    Differs(Vec<DirComparisonEntry>),
}

impl DirComparison {
    /// Renders the differences one per line, or returns an empty string if there are none.
    pub fn describe(&self) -> String {
        let mut output = String::new();

        if let Self::Differs(entries) = self {
            for entry in entries {
                match entry {
                    DirComparisonEntry::CandidateOnly(p) | DirComparisonEntry::ReferenceOnly(p) => {
                        let dir = p.parent().unwrap_or_else(|| Path::new(""));
                        let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                        let _ = writeln!(output, "Only in {}: {name}", dir.display());
                    }
                    DirComparisonEntry::Different {
                        candidate,
                        reference,
                    } => {
                        let _ = writeln!(
                            output,
                            "Files {} and {} differ",
                            candidate.display(),
                            reference.display()
                        );
                    }
                }
            }
        }

        output
    }
}

fn get_dir_entries(dir_path: &Path) -> Result<BTreeMap<String, fs::FileType>, Error> {
    let mut entries = BTreeMap::new();
    for entry in fs::read_dir(dir_path).map_err(Error::workspace(dir_path))? {
        let entry = entry.map_err(Error::workspace(dir_path))?;
        let file_type = entry.file_type().map_err(Error::workspace(entry.path()))?;
        let filename = entry.file_name().to_string_lossy().to_string();

        entries.insert(filename, file_type);
    }

    Ok(entries)
}

fn one_sided_entries(
    root: &Path,
    wrap: fn(PathBuf) -> DirComparisonEntry,
    entries: &mut Vec<DirComparisonEntry>,
) -> Result<(), Error> {
    let before = entries.len();

    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            entries.push(wrap(entry.path().to_owned()));
        }
    }

    // An empty directory still counts as a difference.
    if entries.len() == before {
        entries.push(wrap(root.to_owned()));
    }

    Ok(())
}

/// Compares the contents of the candidate and reference snapshot directories recursively.
///
/// Entries are sorted by their path relative to the snapshot they were found in, so files that
/// exist on only one side interleave with the rest.
pub fn diff_dirs(candidate_path: &Path, reference_path: &Path) -> Result<DirComparison, Error> {
    let mut entries = vec![];
    collect_differences(candidate_path, reference_path, &mut entries)?;

    if entries.is_empty() {
        return Ok(DirComparison::Same);
    }

    entries.sort_by(|left, right| {
        relative_path(left, candidate_path, reference_path)
            .cmp(relative_path(right, candidate_path, reference_path))
    });

    Ok(DirComparison::Differs(entries))
}

fn relative_path<'a>(
    entry: &'a DirComparisonEntry,
    candidate_root: &Path,
    reference_root: &Path,
) -> &'a Path {
    let (path, root) = match entry {
        DirComparisonEntry::CandidateOnly(path)
        | DirComparisonEntry::Different {
            candidate: path, ..
        } => (path, candidate_root),
        DirComparisonEntry::ReferenceOnly(path) => (path, reference_root),
    };

    path.strip_prefix(root).unwrap_or(path)
}

fn collect_differences(
    candidate_path: &Path,
    reference_path: &Path,
    entries: &mut Vec<DirComparisonEntry>,
) -> Result<(), Error> {
    let candidate_entries = get_dir_entries(candidate_path)?;
    let reference_entries = get_dir_entries(reference_path)?;

    for (filename, file_type) in &candidate_entries {
        let candidate_file_path = candidate_path.join(filename);

        let Some(reference_file_type) = reference_entries.get(filename) else {
            one_sided_entries(
                &candidate_file_path,
                DirComparisonEntry::CandidateOnly,
                entries,
            )?;
            continue;
        };

        let reference_file_path = reference_path.join(filename);

        if file_type.is_dir() && reference_file_type.is_dir() {
            collect_differences(&candidate_file_path, &reference_file_path, entries)?;
        } else if file_type.is_dir() != reference_file_type.is_dir() {
            entries.push(DirComparisonEntry::Different {
                candidate: candidate_file_path,
                reference: reference_file_path,
            });
        } else {
            let candidate_bytes = fs::read(&candidate_file_path)
                .map_err(Error::workspace(&candidate_file_path))?;
            let reference_bytes = fs::read(&reference_file_path)
                .map_err(Error::workspace(&reference_file_path))?;

            if candidate_bytes != reference_bytes {
                entries.push(DirComparisonEntry::Different {
                    candidate: candidate_file_path,
                    reference: reference_file_path,
                });
            }
        }
    }

    for filename in reference_entries.keys() {
        if candidate_entries.contains_key(filename) {
            continue;
        }

        one_sided_entries(
            &reference_path.join(filename),
            DirComparisonEntry::ReferenceOnly,
            entries,
        )?;
    }

    Ok(())
}
