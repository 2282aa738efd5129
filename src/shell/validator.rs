//! Command validation for the shell execution boundary.
//!
//! The analyzer's command text originates from a language model, so the
//! validator assumes adversarial input and fails closed: only an explicit
//! allow-list of read-only inspection verbs is permitted, pipelines are
//! allowed only when every segment starts with an allow-listed verb, and
//! every path-like argument must stay inside the codebase root. Verbs that
//! interpret a script of their own (`awk`, `sed`) get their script arguments
//! screened too, since those can write files or run programs without any
//! shell metacharacter.
//!
//! Validation is pure; nothing here touches the filesystem or spawns a
//! process.

use crate::models::RejectionReason;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Read-only inspection verbs the analyzer may run.
const ALLOWED_VERBS: &[&str] = &[
    "ls", "find", "tree", "grep", "egrep", "fgrep", "rg", "cat", "head", "tail", "wc", "file",
    "stat", "du", "sort", "uniq", "cut", "awk", "sed", "basename", "dirname",
];

/// Substrings that enable chaining, substitution, or redirection. A plain
/// pipe is handled separately so read-only pipelines still work.
const FORBIDDEN_SYNTAX: &[&str] = &[";", "&", ">", "<", "`", "$(", "${", "\n", "\r"];

/// Verdict of validating a proposed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Permitted,
    Rejected(RejectionReason),
}

impl Verdict {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Verdict::Permitted)
    }
}

/// Validates raw command strings against the allow-list and the codebase
/// root confinement.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    codebase_root: PathBuf,
}

impl CommandValidator {
    /// Create a validator confining path arguments to `codebase_root`.
    ///
    /// The root should already be canonical; the validator only performs
    /// lexical resolution against it.
    pub fn new(codebase_root: PathBuf) -> Self {
        Self { codebase_root }
    }

    /// Classify a raw command as permitted or rejected.
    pub fn validate(&self, raw: &str) -> Verdict {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Verdict::Rejected(RejectionReason::DisallowedCommand);
        }

        for pattern in FORBIDDEN_SYNTAX {
            if trimmed.contains(pattern) {
                debug!(command = trimmed, pattern, "rejecting command syntax");
                return Verdict::Rejected(RejectionReason::DisallowedSyntax);
            }
        }

        // Each pipeline segment must independently pass the verb and flag
        // checks. An empty segment means a dangling or doubled pipe.
        let segments = match split_pipeline(trimmed) {
            Some(segments) => segments,
            None => return Verdict::Rejected(RejectionReason::DisallowedSyntax),
        };

        for segment in &segments {
            let tokens = match tokenize(segment) {
                Some(tokens) if !tokens.is_empty() => tokens,
                _ => return Verdict::Rejected(RejectionReason::DisallowedSyntax),
            };

            let verb = tokens[0].as_str();
            if !ALLOWED_VERBS.contains(&verb) {
                debug!(command = trimmed, verb, "rejecting command verb");
                return Verdict::Rejected(RejectionReason::DisallowedCommand);
            }

            if has_unsafe_args(verb, &tokens[1..]) {
                debug!(command = trimmed, verb, "rejecting unsafe argument");
                return Verdict::Rejected(RejectionReason::DisallowedCommand);
            }

            for arg in &tokens[1..] {
                if looks_like_path(arg) && self.escapes_root(arg) {
                    debug!(command = trimmed, arg, "rejecting path escape");
                    return Verdict::Rejected(RejectionReason::PathEscape);
                }
            }
        }

        Verdict::Permitted
    }

    /// Whether a path argument lexically resolves outside the codebase root.
    fn escapes_root(&self, arg: &str) -> bool {
        let path = Path::new(arg);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.codebase_root.join(path)
        };

        match normalize_lexically(&joined) {
            Some(resolved) => !resolved.starts_with(&self.codebase_root),
            // Traversal below the filesystem root; nothing legitimate does this.
            None => true,
        }
    }
}

/// Split a command into pipeline segments on unquoted `|` only, so patterns
/// like `grep -E 'foo|bar'` stay in one segment. Returns `None` on unbalanced
/// quotes (fail closed).
pub(crate) fn split_pipeline(command: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for ch in command.chars() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            '|' if !in_single && !in_double => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }

    if in_single || in_double {
        return None;
    }
    segments.push(current);
    Some(segments)
}

/// Split a command segment into whitespace-separated tokens, honoring single
/// and double quotes. Returns `None` on unbalanced quotes (fail closed).
pub(crate) fn tokenize(segment: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for ch in segment.chars() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_single || in_double {
        return None;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Some(tokens)
}

/// Arguments that make an otherwise read-only verb write, execute, or escape
/// confinement.
fn has_unsafe_args(verb: &str, args: &[String]) -> bool {
    match verb {
        "find" => args.iter().any(|a| {
            matches!(
                a.as_str(),
                "-delete" | "-exec" | "-execdir" | "-ok" | "-okdir" | "-fprint" | "-fprintf"
            )
        }),
        "awk" => awk_args_escape(args),
        "sed" => sed_args_escape(args),
        _ => false,
    }
}

/// awk programs can shell out through `system()` and command pipes without
/// any forbidden metacharacter in the outer command, and `-f` loads a program
/// the validator cannot see.
fn awk_args_escape(args: &[String]) -> bool {
    args.iter().any(|a| {
        if a.starts_with("-f") || a.starts_with("--file") {
            return true;
        }
        if a.starts_with('-') {
            return false;
        }
        a.contains("system(") || a.contains('|')
    })
}

/// sed scripts can write files (`w`, `s///w`), run programs (`e`, `s///e`),
/// and read files by a path embedded in the script (`r`). In-place editing
/// and script files are rejected outright; inline scripts are parsed just
/// enough to spot those commands, and anything unparseable is rejected.
fn sed_args_escape(args: &[String]) -> bool {
    let mut expect_script = false;
    let mut have_script = false;

    for arg in args {
        if expect_script {
            expect_script = false;
            have_script = true;
            if sed_script_escapes(arg) {
                return true;
            }
            continue;
        }

        if let Some(script) = arg.strip_prefix("--expression=") {
            have_script = true;
            if sed_script_escapes(script) {
                return true;
            }
        } else if arg == "--expression" {
            expect_script = true;
        } else if arg.starts_with("--") {
            if arg.starts_with("--in-place") || arg.starts_with("--file") {
                return true;
            }
        } else if let Some(cluster) = arg.strip_prefix('-') {
            // Short option cluster: `i` (in-place) and `f` (script file) are
            // out; an attached `-e` expression still gets screened.
            for (i, c) in cluster.char_indices() {
                match c {
                    'i' | 'f' => return true,
                    'e' => {
                        let attached = &cluster[i + 1..];
                        if attached.is_empty() {
                            expect_script = true;
                        } else {
                            have_script = true;
                            if sed_script_escapes(attached) {
                                return true;
                            }
                        }
                        break;
                    }
                    _ => {}
                }
            }
        } else if !have_script {
            // First positional argument is the script; the rest are input
            // files, checked by the path rules like any other argument.
            have_script = true;
            if sed_script_escapes(arg) {
                return true;
            }
        }
    }

    false
}

/// Whether one inline sed script writes, executes, or reads by embedded path.
///
/// `;` and newlines are forbidden at the syntax screen, so a script holds a
/// single command and one leading address range is all there is to strip.
fn sed_script_escapes(script: &str) -> bool {
    let rest = match strip_sed_addresses(script.trim()) {
        Some(rest) => rest,
        None => return true,
    };

    match rest.chars().next() {
        None => false,
        Some('w' | 'W' | 'e' | 'r' | 'R') => true,
        Some('s') => match substitution_flags(rest) {
            Some(flags) => flags.contains('w') || flags.contains('W') || flags.contains('e'),
            None => true,
        },
        _ => false,
    }
}

/// Strip up to two leading addresses (`N`, `N~M`, `$`, `/re/`, `\cREc`) plus
/// the optional `!` negation, leaving the command itself.
fn strip_sed_addresses(script: &str) -> Option<&str> {
    let mut rest = script;

    for _ in 0..2 {
        rest = rest.trim_start();
        let stripped = match rest.chars().next() {
            Some(c) if c.is_ascii_digit() => {
                let end = rest
                    .find(|c: char| !c.is_ascii_digit() && c != '~')
                    .unwrap_or(rest.len());
                &rest[end..]
            }
            Some('$') => &rest[1..],
            Some('/') => skip_field(&rest[1..], '/')?,
            Some('\\') => {
                let delim = rest[1..].chars().next()?;
                skip_field(&rest[1 + delim.len_utf8()..], delim)?
            }
            _ => break,
        };
        rest = stripped.trim_start();
        match rest.strip_prefix(',') {
            Some(after) => rest = after,
            None => break,
        }
    }

    Some(rest.trim_start().trim_start_matches('!').trim_start())
}

/// Flags of an `s` command: skip the pattern and replacement fields and
/// return what follows. `None` when the substitution is malformed.
fn substitution_flags(rest: &str) -> Option<&str> {
    let after_s = &rest[1..];
    let delim = after_s.chars().next()?;
    let pattern = &after_s[delim.len_utf8()..];
    let replacement = skip_field(pattern, delim)?;
    skip_field(replacement, delim)
}

/// Advance past one `delim`-terminated field, honoring backslash escapes.
fn skip_field(s: &str, delim: char) -> Option<&str> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == delim {
            return Some(&s[i + c.len_utf8()..]);
        }
    }
    None
}

/// Heuristic for arguments that name filesystem locations. Flags and search
/// patterns are skipped; anything with a separator or leading dot-traversal
/// is treated as a path.
fn looks_like_path(arg: &str) -> bool {
    if arg.starts_with('-') {
        return false;
    }
    arg.contains('/') || arg == "." || arg == ".." || arg.starts_with("./") || arg.starts_with("..")
}

/// Resolve `.` and `..` components without touching the filesystem. Returns
/// `None` when `..` would climb past the root of the path.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => resolved.push(p.as_os_str()),
            Component::RootDir => resolved.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::Normal(part) => resolved.push(part),
        }
    }
    Some(resolved)
}
