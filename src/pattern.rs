//! Numbered image path patterns.
//!
//! Two forms are accepted, each with exactly one numeric placeholder:
//!
//! - printf style, `img_%05d.png` or `img_%d.png` (FFmpeg `image2`
//!   convention: digits are always zero-padded to the given width, `%%`
//!   is a literal `%`);
//! - wildcard, `frames/*.png` or `shots/*/upscaled.png`: the pattern is
//!   globbed once and each file's number is read from the digits matched
//!   by `*`. The `*` may sit in any path component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ReframeError;

/// A parsed replacement path pattern.
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// `prefix%0Ndsuffix`.
    Printf {
        /// Text before the placeholder, with `%%` already unescaped.
        prefix: String,
        /// Minimum digit count (zero-padded).
        width: usize,
        /// Text after the placeholder, with `%%` already unescaped.
        suffix: String,
    },
    /// `prefix*suffix`, resolved against the files that matched.
    Wildcard {
        /// Files found, keyed by the number in their name.
        entries: BTreeMap<u64, PathBuf>,
        /// Template used in diagnostics for numbers with no file.
        template: String,
    },
}

impl PathPattern {
    /// Parse `pattern`. Wildcard patterns are globbed immediately.
    ///
    /// # Errors
    ///
    /// - [`ReframeError::InvalidPattern`] when there is not exactly one
    ///   placeholder, or a wildcard matches no numbered file or two files
    ///   with the same number.
    /// - [`ReframeError::Io`] if a directory on the wildcard path cannot be
    ///   read.
    pub fn parse(pattern: &str) -> Result<Self, ReframeError> {
        let invalid = |reason: &str| ReframeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let wildcard_count = pattern.matches('*').count();
        let printf = parse_printf(pattern).map_err(|reason| invalid(&reason))?;

        match (printf, wildcard_count) {
            (Some(_), n) if n > 0 => Err(invalid("mixes `*` and a `%d` placeholder")),
            (Some((prefix, width, suffix)), _) => Ok(PathPattern::Printf {
                prefix,
                width,
                suffix,
            }),
            (None, 1) => scan_wildcard(pattern),
            (None, 0) => Err(invalid("no `%d` or `*` placeholder")),
            (None, _) => Err(invalid("more than one `*` placeholder")),
        }
    }

    /// Path of the file numbered `number`.
    ///
    /// Printf patterns always produce a path (it may not exist); wildcard
    /// patterns return `None` when no matched file carries that number.
    pub fn resolve(&self, number: u64) -> Option<PathBuf> {
        match self {
            PathPattern::Printf {
                prefix,
                width,
                suffix,
            } => Some(PathBuf::from(format!("{prefix}{number:0width$}{suffix}"))),
            PathPattern::Wildcard { entries, .. } => entries.get(&number).cloned(),
        }
    }

    /// The path to report when `number` has no file.
    pub fn describe(&self, number: u64) -> PathBuf {
        match self {
            PathPattern::Wildcard { template, .. } => {
                PathBuf::from(template.replacen('*', &number.to_string(), 1))
            }
            PathPattern::Printf { .. } => self.resolve(number).unwrap_or_default(),
        }
    }

    /// Number of files, when known up front (wildcard patterns).
    pub fn count_hint(&self) -> Option<usize> {
        match self {
            PathPattern::Printf { .. } => None,
            PathPattern::Wildcard { entries, .. } => Some(entries.len()),
        }
    }

    /// Smallest number among the matched files (wildcard patterns only).
    pub fn first_number(&self) -> Option<u64> {
        match self {
            PathPattern::Printf { .. } => None,
            PathPattern::Wildcard { entries, .. } => entries.keys().next().copied(),
        }
    }
}

/// Returns `Ok(Some((prefix, width, suffix)))` for a single `%d`
/// placeholder, `Ok(None)` for none.
fn parse_printf(pattern: &str) -> Result<Option<(String, usize, String)>, String> {
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut width = None;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        let target = if width.is_some() { &mut suffix } else { &mut prefix };
        if c != '%' {
            target.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            target.push('%');
            continue;
        }

        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        if chars.next() != Some('d') {
            return Err("`%` must be followed by `d`, `0Nd`, or `%`".to_string());
        }
        if width.is_some() {
            return Err("more than one `%d` placeholder".to_string());
        }
        let parsed = if digits.is_empty() {
            0
        } else {
            digits
                .parse::<usize>()
                .map_err(|_| format!("invalid placeholder width `{digits}`"))?
        };
        width = Some(parsed);
    }

    Ok(width.map(|width| (prefix, width, suffix)))
}

fn scan_wildcard(pattern: &str) -> Result<PathPattern, ReframeError> {
    let invalid = |reason: String| ReframeError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };

    // Locate the component holding `*`; the number is read from the same
    // component of every match, counted from the end of the path.
    let components: Vec<&str> = Path::new(pattern)
        .components()
        .map(|component| component.as_os_str().to_str().unwrap_or_default())
        .collect();
    let position = components
        .iter()
        .position(|component| component.contains('*'))
        .ok_or_else(|| invalid("missing `*`".to_string()))?;
    let from_end = components.len() - position - 1;
    let (component_prefix, component_suffix) = components[position]
        .split_once('*')
        .ok_or_else(|| invalid("missing `*`".to_string()))?;

    let (prefix, suffix) = pattern
        .split_once('*')
        .ok_or_else(|| invalid("missing `*`".to_string()))?;
    let glob_pattern = format!(
        "{}*{}",
        glob::Pattern::escape(prefix),
        glob::Pattern::escape(suffix)
    );

    let paths = glob::glob(&glob_pattern).map_err(|e| invalid(e.to_string()))?;
    let mut entries = BTreeMap::new();
    let mut unordered = Vec::new();
    for path in paths {
        let path = path.map_err(glob::GlobError::into_error)?;
        if !path.is_file() {
            continue;
        }
        let middle = path
            .components()
            .rev()
            .nth(from_end)
            .and_then(|component| component.as_os_str().to_str())
            .and_then(|component| component.strip_prefix(component_prefix))
            .and_then(|component| component.strip_suffix(component_suffix));
        let Some(middle) =
            middle.filter(|m| !m.is_empty() && m.bytes().all(|b| b.is_ascii_digit()))
        else {
            unordered.push(path.display().to_string());
            continue;
        };
        let number: u64 = middle.parse().map_err(|_| {
            invalid(format!("number in `{}` is out of range", path.display()))
        })?;
        if let Some(existing) = entries.insert(number, path.clone()) {
            return Err(invalid(format!(
                "`{}` and `{}` both carry number {number}",
                existing.display(),
                path.display()
            )));
        }
    }

    if !unordered.is_empty() {
        log::warn!(
            "Ignoring {} file(s) without a frame number matching `{pattern}`, e.g. {:?}",
            unordered.len(),
            &unordered[..unordered.len().min(3)],
        );
    }
    if entries.is_empty() {
        return Err(invalid("no numbered files match".to_string()));
    }

    log::debug!("Pattern `{pattern}` matched {} numbered file(s)", entries.len());
    Ok(PathPattern::Wildcard {
        entries,
        template: pattern.to_string(),
    })
}
