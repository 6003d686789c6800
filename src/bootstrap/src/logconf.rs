// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rewrites the `error_logger_mf_dir` directive in the server's static
//! configuration file.
//!
//! The static configuration is a line-oriented Erlang term file; the
//! directive of interest is a single line of the form
//! `{error_logger_mf_dir, "/var/log/cb"}.`. Only that line is ever
//! touched. Whenever the rewrite reports a change the caller is obligated
//! to restart the service, or the running process would diverge from the
//! on-disk configuration.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

const LOG_DIRECTIVE_KEY: &str = "error_logger_mf_dir";

/// Renders the directive line for the desired log directory, verbatim as
/// the server expects it.
pub fn render_log_directive(log_dir: &Path) -> String {
    format!("{{{}, \"{}\"}}.", LOG_DIRECTIVE_KEY, log_dir.display())
}

/// Points the error logger directive at `desired_log_dir`, returning
/// whether the file was modified.
///
/// The desired line is checked for before anything is written, so a file
/// that already matches is left completely untouched. A stale directive is
/// replaced in place, leaving every other line byte-identical; a file with
/// no directive at all gains one at the end. I/O failures propagate to the
/// caller unretried.
pub fn ensure_log_directive(path: &Path, desired_log_dir: &Path) -> Result<bool, io::Error> {
    let desired = render_log_directive(desired_log_dir);
    let contents = fs::read_to_string(path)?;

    // Guard before acting, like `grep` in a not_if clause: an exact match
    // anywhere means there is nothing to do.
    if contents.lines().any(|line| line == desired) {
        debug!(path = %path.display(), "log directive already current");
        return Ok(false);
    }

    // Splice only the directive's own bytes so every other line survives
    // exactly, including CRLF endings and a missing final newline.
    let rewritten = match directive_span(&contents) {
        Some((start, end)) => {
            format!("{}{}{}", &contents[..start], desired, &contents[end..])
        }
        None => {
            let mut out = contents.clone();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&desired);
            out.push('\n');
            out
        }
    };
    fs::write(path, rewritten)?;
    debug!(path = %path.display(), directive = %desired, "rewrote log directive");
    Ok(true)
}

/// Byte range of the directive line's content, excluding its line ending.
fn directive_span(contents: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for raw in contents.split_inclusive('\n') {
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.contains(LOG_DIRECTIVE_KEY) {
            return Some((offset, offset + line.len()));
        }
        offset += raw.len();
    }
    None
}
