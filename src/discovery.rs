use std::collections::BTreeSet;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Result, ScrubError};

/// One `storage.filter` entry: a sign and a pattern.
#[derive(Debug, Clone)]
struct FilterRule {
    accept: bool,
    pattern: Regex,
}

/// An ordered, first-match-wins path filter.
///
/// Each candidate path is matched with a leading `/` ensured and, for
/// directories, a trailing `/` appended, so rules can anchor on either end.
/// The first rule whose pattern matches anywhere in the path decides; when
/// nothing matches the path is accepted.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<FilterRule>,
}

impl PathFilter {
    /// A filter that accepts everything.
    pub fn empty() -> Self {
        PathFilter::default()
    }

    /// Parses `storage.filter` entries of the form `"+<regex>"` / `"-<regex>"`.
    pub fn parse(specs: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            let accept = match spec.chars().next() {
                Some('+') => true,
                Some('-') => false,
                _ => {
                    return Err(ScrubError::InvalidFilterRule {
                        rule: spec.clone(),
                        message: "must start with '+' (accept) or '-' (reject)".to_string(),
                    });
                }
            };
            let pattern = Regex::new(&spec[1..]).map_err(|err| ScrubError::InvalidFilterRule {
                rule: spec.clone(),
                message: err.to_string(),
            })?;
            rules.push(FilterRule { accept, pattern });
        }
        Ok(PathFilter { rules })
    }

    /// Decides whether `path` passes the filter.
    ///
    /// Matching needs a textual view; the conversion is lossy and a path
    /// that decodes badly degrades to the default-accept outcome.
    pub fn check(&self, path: &Path, is_dir: bool) -> bool {
        let mut text = path.to_string_lossy().into_owned();
        if !text.starts_with('/') {
            text.insert(0, '/');
        }
        if is_dir && !text.ends_with('/') {
            text.push('/');
        }
        for rule in &self.rules {
            if rule.pattern.is_match(&text) {
                return rule.accept;
            }
        }
        true
    }
}

/// Lazily yields `(path, stat)` pairs for the regular files under a set of
/// roots.
///
/// Roots are canonicalized and deduplicated up front; a root that cannot be
/// resolved or stat'd is logged and skipped. Each root is traversed top-down
/// without following symlinks, so the emitted metadata is always a link-stat.
/// A root nested under another root is pruned from the outer traversal and
/// consumed by its own, which also exempts it from the cross-device policy.
pub struct FileWalker {
    pending: Vec<PathBuf>,
    roots: BTreeSet<PathBuf>,
    filter: PathFilter,
    xdev: bool,
    current: Option<(walkdir::IntoIter, u64)>,
}

impl FileWalker {
    pub fn new(roots: &[PathBuf], xdev: bool, filter: PathFilter) -> Self {
        let mut canonical = BTreeSet::new();
        for root in roots {
            match std::fs::canonicalize(root) {
                Ok(resolved) => {
                    canonical.insert(resolved);
                }
                Err(err) => warn!("skipping unresolvable root {}: {err}", root.display()),
            }
        }
        let mut pending: Vec<PathBuf> = canonical.iter().cloned().collect();
        pending.reverse();
        FileWalker {
            pending,
            roots: canonical,
            filter,
            xdev,
            current: None,
        }
    }

    /// Moves on to the next pending root, capturing its device id.
    fn advance_root(&mut self) -> bool {
        while let Some(root) = self.pending.pop() {
            let dev = match std::fs::metadata(&root) {
                Ok(meta) => meta.dev(),
                Err(err) => {
                    warn!("skipping unreadable root {}: {err}", root.display());
                    continue;
                }
            };
            debug!("walking root: {}", root.display());
            self.current = Some((WalkDir::new(&root).follow_links(false).into_iter(), dev));
            return true;
        }
        false
    }

    fn skip_current_dir(&mut self) {
        if let Some((walker, _)) = self.current.as_mut() {
            walker.skip_current_dir();
        }
    }
}

impl Iterator for FileWalker {
    type Item = (PathBuf, Metadata);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() && !self.advance_root() {
                return None;
            }

            let step = {
                let (walker, _) = self.current.as_mut().expect("active traversal");
                walker.next()
            };

            let entry = match step {
                None => {
                    self.current = None;
                    continue;
                }
                Some(Err(err)) => {
                    warn!("walk error: {err}");
                    continue;
                }
                Some(Ok(entry)) => entry,
            };

            if entry.file_type().is_dir() {
                if entry.depth() == 0 {
                    continue;
                }
                let root_dev = self.current.as_ref().expect("active traversal").1;
                let foreign_root = self.roots.contains(entry.path());
                let other_device = self.xdev
                    && entry
                        .metadata()
                        .map(|meta| meta.dev() != root_dev)
                        .unwrap_or(false);
                if foreign_root || other_device || !self.filter.check(entry.path(), true) {
                    self.skip_current_dir();
                }
                continue;
            }

            // Symlinks and other non-regular entries are not scrub targets.
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.filter.check(entry.path(), false) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => return Some((entry.into_path(), meta)),
                Err(err) => {
                    debug!("cannot stat {}: {err}", entry.path().display());
                    continue;
                }
            }
        }
    }
}
