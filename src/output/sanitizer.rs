//! Terminal control-sequence removal and line-ending normalization.
//!
//! Provider CLIs draw spinners, colours and window titles with escape
//! sequences. These corrupt transcripts and any terminal that replays
//! them, so every output chunk passes through [`sanitize`] before it is
//! forwarded, accumulated or written to an artifact.

use std::sync::LazyLock;

use regex::Regex;

/// Sequences removed from output, tried leftmost-first:
///
/// | Alternative                   | Sequence                                 |
/// |-------------------------------|------------------------------------------|
/// | `ESC [` / `U+009B` … final    | CSI (colours, cursor movement)           |
/// | `ESC ]` … `BEL` or `ESC \`    | OSC (window title, hyperlinks)           |
/// | `ESC P/X/^/_` … `ESC \`       | DCS, SOS, PM, APC                        |
/// | `ESC (` / `ESC )` + designator| charset designation                      |
/// | `ESC` + single byte           | keypad mode, save/restore cursor, index  |
/// | `[` digits `;` … letter       | bracket codes emitted without the `ESC`  |
/// | lone `ESC`                    | anything left over                       |
const PATTERN: &str = concat!(
    r"(?s)(?:\x1b\[|\x{9b})[0-?]*[ -/]*[@-~]",
    r"|\x1b\].*?(?:\x07|\x1b\\)",
    r"|\x1b[PX^_].*?\x1b\\",
    r"|\x1b[()][A-Za-z0-9]",
    r"|\x1b[=>78cDEHM]",
    r"|\[\??[0-9;]{1,10}[A-Za-z]",
    r"|\x1b",
);

// The pattern is a literal; compilation cannot fail at runtime.
#[allow(clippy::expect_used)]
static CONTROL_SEQUENCES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PATTERN).expect("control-sequence pattern is valid"));

/// Strip terminal control sequences and normalize line endings to `\n`.
///
/// Removal is repeated until nothing changes, because deleting one
/// sequence can splice its neighbours into a new one
/// (`ESC ESC[31m[0m` becomes `ESC[0m`). The result is therefore
/// idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut current = strip_once(raw);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Lossily decode `raw` as UTF-8, then [`sanitize`] it.
#[must_use]
pub fn sanitize_bytes(raw: &[u8]) -> String {
    sanitize(&String::from_utf8_lossy(raw))
}

fn strip_once(text: &str) -> String {
    let stripped = CONTROL_SEQUENCES.replace_all(text, "");
    if stripped.contains('\r') {
        stripped.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        stripped.into_owned()
    }
}
